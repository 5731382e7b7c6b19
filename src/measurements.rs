/// Measurement collector.
///
/// `collect` handles one station end to end and always returns an outcome;
/// no error crosses the station boundary. `sweep` runs `collect` over every
/// active station and tallies the outcomes.
///
/// Per station:
///   1. Fetch the live reading with the short station timeout. Not-found
///      means permanently inactive; the sentinel code is also deactivated.
///   2. Parse the epoch and clean the eight sensor channels.
///   3. Classify the reading age: expired readings report the station as
///      permanently inactive (without deactivating it), stale ones as stale.
///   4. In one unit of work, skip if (station, epoch) is already stored,
///      else insert the row with `is_valid = true`.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::config::EtlConfig;
use crate::freshness::{self, Clock, Freshness};
use crate::ingest::fetch::{Fetch, FetchError};
use crate::ingest::siata;
use crate::model::{CollectOutcome, Measurement, StationCode};
use crate::store::{unit_of_work, Store, StoreError};

/// Progress is logged after this many stations.
pub const PROGRESS_EVERY: usize = 25;

// ---------------------------------------------------------------------------
// Sweep summary
// ---------------------------------------------------------------------------

/// Outcome counts for one sweep over the active stations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    counts: HashMap<CollectOutcome, usize>,
}

impl SweepSummary {
    pub fn record(&mut self, outcome: CollectOutcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    pub fn count(&self, outcome: CollectOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total={}", self.total())?;
        for outcome in CollectOutcome::ALL {
            write!(f, " {}={}", outcome, self.count(outcome))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

pub struct MeasurementCollector<'a> {
    fetcher: &'a dyn Fetch,
    store: &'a dyn Store,
    clock: &'a dyn Clock,
    config: &'a EtlConfig,
}

impl<'a> MeasurementCollector<'a> {
    pub fn new(
        fetcher: &'a dyn Fetch,
        store: &'a dyn Store,
        clock: &'a dyn Clock,
        config: &'a EtlConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            clock,
            config,
        }
    }

    /// Collects the live reading of one station.
    pub fn collect(&self, code: StationCode) -> CollectOutcome {
        let url = siata::station_reading_url(&self.config.base_url, code);

        let document = match self.fetcher.fetch_json(&url, self.config.station_timeout()) {
            Ok(document) => document,
            Err(FetchError::NotFound { .. }) => {
                if code == self.config.sentinel_station {
                    self.deactivate(code);
                }
                return CollectOutcome::PermanentlyInactive;
            }
            Err(e @ FetchError::Transient { .. }) => {
                warn!("station {}: {}", code, e);
                return CollectOutcome::TransientError;
            }
        };

        let reading = match siata::parse_live_reading(&document) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("station {}: rejected payload: {}", code, e);
                return CollectOutcome::LogicError;
            }
        };

        let epoch = reading.source_timestamp;
        let (Some(observed_at), Some(age)) = (
            freshness::provider_wall_time(epoch),
            freshness::reading_age(self.clock.now(), epoch),
        ) else {
            warn!("station {}: timestamp {} out of range", code, epoch);
            return CollectOutcome::LogicError;
        };

        match Freshness::classify(age) {
            Freshness::Expired => {
                debug!("station {}: last reading {} is over a day old", code, observed_at);
                return CollectOutcome::PermanentlyInactive;
            }
            Freshness::Stale => {
                debug!("station {}: last reading {} is stale", code, observed_at);
                return CollectOutcome::Stale;
            }
            Freshness::Fresh => {}
        }

        let measurement = Measurement {
            station: code,
            source_timestamp: epoch,
            observed_at,
            readings: reading.readings,
            is_valid: true,
        };

        match self.persist(&measurement) {
            Ok(true) => CollectOutcome::Fresh,
            Ok(false) => CollectOutcome::Duplicate,
            // Another worker stored the same reading between check and insert.
            Err(StoreError::Constraint(_)) => CollectOutcome::Duplicate,
            Err(e) => {
                error!("station {}: failed to store reading {}: {}", code, epoch, e);
                CollectOutcome::LogicError
            }
        }
    }

    /// Inserts unless already present. `Ok(false)` means duplicate.
    fn persist(&self, measurement: &Measurement) -> Result<bool, StoreError> {
        unit_of_work(self.store, |cursor| {
            if cursor.measurement_exists(measurement.station, measurement.source_timestamp)? {
                return Ok(false);
            }
            cursor.insert_measurement(measurement)?;
            Ok(true)
        })
    }

    fn deactivate(&self, code: StationCode) {
        match unit_of_work::<_, StoreError, _>(self.store, |cursor| {
            cursor.deactivate_station(code)
        }) {
            Ok(true) => info!("deactivated station {} (not found upstream)", code),
            Ok(false) => debug!("station {} not registered, nothing to deactivate", code),
            Err(e) => error!("failed to deactivate station {}: {}", code, e),
        }
    }

    /// Collects every active station. Fails only if the station list
    /// itself cannot be read.
    pub fn sweep(&self) -> Result<SweepSummary, StoreError> {
        let codes = unit_of_work::<_, StoreError, _>(self.store, |cursor| {
            cursor.active_station_codes()
        })?;
        info!("collecting measurements for {} active stations", codes.len());

        let mut summary = SweepSummary::default();
        for (index, code) in codes.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.collect(*code)))
                .unwrap_or_else(|_| {
                    error!("station {}: collector panicked", code);
                    CollectOutcome::LogicError
                });
            summary.record(outcome);

            let processed = index + 1;
            if processed % PROGRESS_EVERY == 0 {
                info!("processed {}/{} stations", processed, codes.len());
            }
        }

        info!("measurement sweep finished: {}", summary);
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
