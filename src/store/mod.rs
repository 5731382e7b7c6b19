/// Storage contract consumed by the collectors.
///
/// All access goes through a scoped [`Cursor`] obtained from [`Store::cursor`].
/// A cursor is one transactional unit of work (one station, one forecast
/// zone, one registry sync). Its work is kept only if [`Cursor::commit`] is
/// called; dropping it on any other path rolls back and releases the
/// underlying connection.

pub mod memory;

use thiserror::Error;

use crate::model::{ForecastEntry, Measurement, Station, StationCode};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be acquired.
    #[error("connection pool unavailable: {0}")]
    Pool(String),
    /// A statement failed.
    #[error("query failed: {0}")]
    Query(String),
    /// A unique key was violated (e.g. concurrent insert of the same reading).
    #[error("unique constraint violated: {0}")]
    Constraint(String),
}

/// A pool of scoped cursors.
pub trait Store: Send + Sync {
    fn cursor(&self) -> Result<Box<dyn Cursor + '_>, StoreError>;
}

/// One transactional unit of work against the store.
pub trait Cursor {
    /// Inserts or updates a station by code; forces `active = true` and
    /// refreshes its update timestamp.
    fn upsert_station(&mut self, station: &Station) -> Result<(), StoreError>;

    fn active_station_codes(&mut self) -> Result<Vec<StationCode>, StoreError>;

    /// Clears the active flag. Returns whether the station existed.
    fn deactivate_station(&mut self, code: StationCode) -> Result<bool, StoreError>;

    fn measurement_exists(
        &mut self,
        station: StationCode,
        source_timestamp: i64,
    ) -> Result<bool, StoreError>;

    /// Fails with `Constraint` if (station, source timestamp) already exists.
    fn insert_measurement(&mut self, measurement: &Measurement) -> Result<(), StoreError>;

    /// Row id of the forecast for (zone, date), if any.
    fn find_forecast(&mut self, zone: &str, date: &str) -> Result<Option<i64>, StoreError>;

    /// Overwrites issue date, temperatures and rain labels of row `id`.
    fn update_forecast(&mut self, id: i64, entry: &ForecastEntry) -> Result<(), StoreError>;

    /// Fails with `Constraint` if (zone, date) already exists.
    fn insert_forecast(&mut self, entry: &ForecastEntry) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Runs `work` on a fresh cursor and commits if it succeeds.
///
/// On error the cursor is dropped uncommitted, so the unit rolls back.
pub fn unit_of_work<T, E, F>(store: &dyn Store, work: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
{
    let mut cursor = store.cursor()?;
    let value = work(cursor.as_mut())?;
    cursor.commit()?;
    Ok(value)
}
