/// Collection orchestrator.
///
/// A full cycle runs, in order:
/// 1. The forecast collector over every configured zone
/// 2. The station registry sync
/// 3. The measurement sweep over every active station
///
/// Each step isolates its own failures: a zone that fails is logged and the
/// loop moves on, a failed sync still lets the sweep run. The cycle never
/// returns an error; it reports what happened and how long it took.

use log::{error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EtlConfig;
use crate::forecast::{ForecastCollector, ForecastTally};
use crate::freshness::Clock;
use crate::ingest::fetch::Fetch;
use crate::measurements::{MeasurementCollector, SweepSummary};
use crate::scheduler::{JobError, Task};
use crate::stations::{StationRegistry, SyncSummary};
use crate::store::{Store, StoreError};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// What one full cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Zones collected successfully with their counts.
    pub zones: Vec<(String, ForecastTally)>,
    /// Zones whose collection failed.
    pub failed_zones: Vec<String>,
    /// `None` when the sync failed.
    pub sync: Option<SyncSummary>,
    /// `None` when the active station list could not be read.
    pub sweep: Option<SweepSummary>,
    /// Set when a step panicked and the rest of the cycle was abandoned.
    pub aborted: bool,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

pub struct Daemon {
    config: EtlConfig,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Daemon {
    pub fn new(
        config: EtlConfig,
        fetcher: Arc<dyn Fetch>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    fn measurement_collector(&self) -> MeasurementCollector<'_> {
        MeasurementCollector::new(
            self.fetcher.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.config,
        )
    }

    /// Forecasts, then station sync, then the measurement sweep.
    pub fn run_full_cycle(&self) -> CycleReport {
        let started = Instant::now();
        info!("starting full collection cycle");

        let mut report = CycleReport::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cycle_steps(&mut report)));
        if outcome.is_err() {
            error!("collection cycle aborted by a panic");
            report.aborted = true;
        }

        report.elapsed = started.elapsed();
        info!(
            "full collection cycle finished in {:.1?} ({} zones ok, {} failed)",
            report.elapsed,
            report.zones.len(),
            report.failed_zones.len()
        );
        report
    }

    fn cycle_steps(&self, report: &mut CycleReport) {
        let forecasts =
            ForecastCollector::new(self.fetcher.as_ref(), self.store.as_ref(), &self.config);
        for zone in &self.config.zones {
            match forecasts.collect(zone) {
                Ok(tally) => report.zones.push((zone.clone(), tally)),
                Err(e) => {
                    error!("forecast zone {} failed: {}", zone, e);
                    report.failed_zones.push(zone.clone());
                }
            }
        }

        let registry =
            StationRegistry::new(self.fetcher.as_ref(), self.store.as_ref(), &self.config);
        match registry.sync() {
            Ok(summary) => report.sync = Some(summary),
            Err(e) => warn!("station sync failed, sweeping known stations: {}", e),
        }

        match self.collect_measurements() {
            Ok(summary) => report.sweep = Some(summary),
            Err(e) => error!("measurement sweep failed: {}", e),
        }
    }

    /// The measurement sweep alone.
    pub fn collect_measurements(&self) -> Result<SweepSummary, StoreError> {
        self.measurement_collector().sweep()
    }

    /// Scheduler task running the full cycle. Never fails.
    pub fn slow_job(self: &Arc<Self>) -> Task {
        let daemon = Arc::clone(self);
        Arc::new(move || -> Result<(), JobError> {
            daemon.run_full_cycle();
            Ok(())
        })
    }

    /// Scheduler task running the measurement sweep.
    pub fn fast_job(self: &Arc<Self>) -> Task {
        let daemon = Arc::clone(self);
        Arc::new(move || -> Result<(), JobError> {
            daemon.collect_measurements()?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::FixedClock;
    use crate::ingest::fetch::{FetchError, TransientCause};
    use crate::ingest::fixtures::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Routes by URL and records the order of requests. Unknown URLs are 404.
    #[derive(Default)]
    struct RoutedFetch {
        routes: HashMap<String, Value>,
        down: Vec<String>,
        log: Mutex<Vec<String>>,
    }

    impl Fetch for RoutedFetch {
        fn fetch_json(&self, url: &str, _timeout: Duration) -> Result<Value, FetchError> {
            self.log.lock().unwrap().push(url.to_string());
            if self.down.iter().any(|u| u == url) {
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    attempts: 3,
                    cause: TransientCause::Status(500),
                });
            }
            self.routes.get(url).cloned().ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            })
        }
    }

    fn config() -> EtlConfig {
        EtlConfig {
            zones: vec!["bello".into(), "caldas".into()],
            ..EtlConfig::default()
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2023, 11, 15, 3, 43, 20).unwrap()))
    }

    fn healthy_fetch(config: &EtlConfig) -> RoutedFetch {
        let base = &config.base_url;
        let mut routes = HashMap::new();
        routes.insert(config.stations_url(), fixture_station_list());
        routes.insert(format!("{}wrfbello.json", base), fixture_zone_forecast());
        routes.insert(format!("{}wrfcaldas.json", base), fixture_zone_forecast());
        routes.insert(format!("{}82.json", base), fixture_live_reading());
        routes.insert(format!("{}201.json", base), fixture_live_reading());
        RoutedFetch {
            routes,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_cycle_runs_forecasts_then_sync_then_sweep() {
        let config = config();
        let fetcher = Arc::new(healthy_fetch(&config));
        let store = Arc::new(MemoryStore::new());
        let daemon = Daemon::new(config.clone(), fetcher.clone(), store.clone(), clock());

        let report = daemon.run_full_cycle();

        let log = fetcher.log.lock().unwrap();
        assert!(log[0].ends_with("wrfbello.json"));
        assert!(log[1].ends_with("wrfcaldas.json"));
        assert_eq!(log[2], config.stations_url(), "sync after forecasts");
        assert_eq!(log.len(), 6, "2 zones + station list + 3 stations");

        assert!(!report.aborted);
        assert_eq!(report.zones.len(), 2);
        assert_eq!(report.sync.as_ref().map(|s| s.received), Some(3));
        let sweep = report.sweep.expect("sweep should run");
        assert_eq!(sweep.count(crate::model::CollectOutcome::Fresh), 2);
        assert_eq!(sweep.count(crate::model::CollectOutcome::PermanentlyInactive), 1);
        assert!(!store.station(999).unwrap().active, "sentinel deactivated");
    }

    #[test]
    fn test_failing_zone_does_not_stop_cycle() {
        let config = config();
        let mut fetch = healthy_fetch(&config);
        fetch.down.push(format!("{}wrfbello.json", config.base_url));
        let store = Arc::new(MemoryStore::new());
        let daemon = Daemon::new(config, Arc::new(fetch), store.clone(), clock());

        let report = daemon.run_full_cycle();

        assert_eq!(report.failed_zones, vec!["bello".to_string()]);
        assert_eq!(report.zones.len(), 1);
        assert!(store.forecasts_for("bello").is_empty());
        assert_eq!(store.forecasts_for("caldas").len(), 2);
        assert!(report.sweep.is_some(), "cycle continues to the sweep");
    }

    #[test]
    fn test_failed_sync_still_sweeps_known_stations() {
        let config = config();
        let mut fetch = healthy_fetch(&config);
        fetch.down.push(config.stations_url());
        let store = Arc::new(MemoryStore::new());
        let daemon = Daemon::new(config, Arc::new(fetch), store, clock());

        let report = daemon.run_full_cycle();

        assert!(report.sync.is_none());
        assert_eq!(report.sweep.map(|s| s.total()), Some(0), "no stations known yet");
    }

    #[test]
    fn test_unavailable_store_is_logged_not_raised() {
        let config = config();
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let fetcher = Arc::new(healthy_fetch(&config));
        let daemon = Daemon::new(config, fetcher, store, clock());

        let report = daemon.run_full_cycle();

        assert_eq!(report.failed_zones.len(), 2);
        assert!(report.sync.is_none());
        assert!(report.sweep.is_none());
        assert!(!report.aborted);
    }

    #[test]
    fn test_panicking_fetcher_aborts_cycle_without_unwinding() {
        struct Exploding;
        impl Fetch for Exploding {
            fn fetch_json(&self, _: &str, _: Duration) -> Result<Value, FetchError> {
                panic!("fetcher bug");
            }
        }

        let daemon = Daemon::new(
            config(),
            Arc::new(Exploding),
            Arc::new(MemoryStore::new()),
            clock(),
        );
        let report = daemon.run_full_cycle();
        assert!(report.aborted);
    }

    #[test]
    fn test_fast_job_reports_store_failure() {
        let config = config();
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let daemon = Arc::new(Daemon::new(
            config.clone(),
            Arc::new(healthy_fetch(&config)),
            store,
            clock(),
        ));

        let fast = daemon.fast_job();
        assert!(matches!(fast(), Err(JobError::Store(_))));
        let slow = daemon.slow_job();
        assert!(slow().is_ok(), "full cycle never fails");
    }
}
