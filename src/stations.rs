/// Station registry sync.
///
/// Fetches the SIATA station list once and upserts every station by code in
/// a single unit of work. Stations absent from the payload are left as they
/// are: absence is not a removal signal, so their active flag is untouched.

use log::info;
use thiserror::Error;

use crate::config::EtlConfig;
use crate::ingest::fetch::{Fetch, FetchError};
use crate::ingest::siata::{self, PayloadError};
use crate::store::{unit_of_work, Store, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("station list fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("station list payload rejected: {0}")]
    Payload(#[from] PayloadError),
    #[error("station upsert failed: {0}")]
    Store(#[from] StoreError),
}

/// What one sync pass saw and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    /// Stations upserted.
    pub received: usize,
    /// Network label declared by the payload (`red`).
    pub network: String,
    /// Entries dropped for lacking a usable code.
    pub skipped: usize,
}

pub struct StationRegistry<'a> {
    fetcher: &'a dyn Fetch,
    store: &'a dyn Store,
    config: &'a EtlConfig,
}

impl<'a> StationRegistry<'a> {
    pub fn new(fetcher: &'a dyn Fetch, store: &'a dyn Store, config: &'a EtlConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    pub fn sync(&self) -> Result<SyncSummary, SyncError> {
        let url = self.config.stations_url();
        let document = self.fetcher.fetch_json(&url, self.config.http_timeout())?;
        let list = siata::parse_station_list(&document)?;

        info!(
            "received {} stations from network '{}'",
            list.stations.len(),
            list.network
        );
        if list.skipped > 0 {
            info!("skipped {} station entries without a usable code", list.skipped);
        }

        unit_of_work(self.store, |cursor| -> Result<(), SyncError> {
            for station in &list.stations {
                cursor.upsert_station(station)?;
            }
            Ok(())
        })?;

        Ok(SyncSummary {
            received: list.stations.len(),
            network: list.network,
            skipped: list.skipped,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
