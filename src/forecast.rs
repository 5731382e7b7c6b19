/// Forecast collector.
///
/// One zone per call, one unit of work per zone. Each daily entry is looked
/// up by (zone, date) and updated in place when present, inserted
/// otherwise, so re-running a zone with an unchanged payload leaves the
/// table as it was. Unlike station measurements, failures are returned to
/// the caller.

use log::info;
use thiserror::Error;

use crate::config::EtlConfig;
use crate::ingest::fetch::{Fetch, FetchError};
use crate::ingest::siata::{self, PayloadError};
use crate::store::{unit_of_work, Store, StoreError};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("forecast fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("forecast payload rejected: {0}")]
    Payload(#[from] PayloadError),
    #[error("forecast save failed: {0}")]
    Store(#[from] StoreError),
}

/// Per-zone counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForecastTally {
    pub inserted: usize,
    pub updated: usize,
    /// Entries without a `fecha`.
    pub skipped: usize,
}

pub struct ForecastCollector<'a> {
    fetcher: &'a dyn Fetch,
    store: &'a dyn Store,
    config: &'a EtlConfig,
}

impl<'a> ForecastCollector<'a> {
    pub fn new(fetcher: &'a dyn Fetch, store: &'a dyn Store, config: &'a EtlConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    pub fn collect(&self, zone: &str) -> Result<ForecastTally, ForecastError> {
        let url = siata::zone_forecast_url(&self.config.base_url, zone);
        let document = self.fetcher.fetch_json(&url, self.config.http_timeout())?;
        let forecast = siata::parse_zone_forecast(zone, &document)?;

        let mut tally = ForecastTally {
            skipped: forecast.skipped,
            ..Default::default()
        };

        unit_of_work(self.store, |cursor| -> Result<(), ForecastError> {
            for entry in &forecast.entries {
                match cursor.find_forecast(&entry.zone, &entry.date)? {
                    Some(id) => {
                        cursor.update_forecast(id, entry)?;
                        tally.updated += 1;
                    }
                    None => {
                        cursor.insert_forecast(entry)?;
                        tally.inserted += 1;
                    }
                }
            }
            Ok(())
        })?;

        info!(
            "forecast {}: {} inserted, {} updated (issued {})",
            zone, tally.inserted, tally.updated, forecast.issued
        );
        Ok(tally)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
