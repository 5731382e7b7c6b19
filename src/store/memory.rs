/// In-memory [`Store`] with the same unique keys as the relational schema.
///
/// A cursor holds the table lock for its whole unit of work and records an
/// undo entry for every row it touches; dropping it without `commit` replays
/// the log backwards. Used by tests and dry runs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Cursor, Store, StoreError};
use crate::model::{ForecastEntry, Measurement, Station, StationCode};

/// A station row as the store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStation {
    pub station: Station,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// A forecast row with its surrogate id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredForecast {
    pub id: i64,
    pub entry: ForecastEntry,
}

#[derive(Debug, Default)]
struct Tables {
    stations: BTreeMap<StationCode, StoredStation>,
    measurements: BTreeMap<(StationCode, i64), Measurement>,
    forecasts: BTreeMap<i64, ForecastEntry>,
    next_forecast_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `cursor()` fails as if the pool were exhausted.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn station(&self, code: StationCode) -> Option<StoredStation> {
        self.lock().stations.get(&code).cloned()
    }

    pub fn stations(&self) -> Vec<StoredStation> {
        self.lock().stations.values().cloned().collect()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.lock().measurements.values().cloned().collect()
    }

    pub fn measurements_for(&self, station: StationCode) -> Vec<Measurement> {
        self.lock()
            .measurements
            .values()
            .filter(|m| m.station == station)
            .cloned()
            .collect()
    }

    pub fn forecasts(&self) -> Vec<StoredForecast> {
        self.lock()
            .forecasts
            .iter()
            .map(|(id, entry)| StoredForecast {
                id: *id,
                entry: entry.clone(),
            })
            .collect()
    }

    pub fn forecasts_for(&self, zone: &str) -> Vec<ForecastEntry> {
        self.lock()
            .forecasts
            .values()
            .filter(|f| f.zone == zone)
            .cloned()
            .collect()
    }
}

impl Store for MemoryStore {
    fn cursor(&self) -> Result<Box<dyn Cursor + '_>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Pool("memory store marked unavailable".into()));
        }
        Ok(Box::new(MemoryCursor {
            tables: self.lock(),
            undo: Vec::new(),
        }))
    }
}

/// Prior state of one touched row.
enum Undo {
    Station(StationCode, Option<StoredStation>),
    Measurement((StationCode, i64)),
    Forecast(i64, Option<ForecastEntry>),
    NextForecastId(i64),
}

struct MemoryCursor<'a> {
    tables: MutexGuard<'a, Tables>,
    /// Replayed newest-first on drop; cleared by `commit`.
    undo: Vec<Undo>,
}

impl Drop for MemoryCursor<'_> {
    fn drop(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Station(code, Some(prior)) => {
                    self.tables.stations.insert(code, prior);
                }
                Undo::Station(code, None) => {
                    self.tables.stations.remove(&code);
                }
                Undo::Measurement(key) => {
                    self.tables.measurements.remove(&key);
                }
                Undo::Forecast(id, Some(prior)) => {
                    self.tables.forecasts.insert(id, prior);
                }
                Undo::Forecast(id, None) => {
                    self.tables.forecasts.remove(&id);
                }
                Undo::NextForecastId(prior) => self.tables.next_forecast_id = prior,
            }
        }
    }
}

impl Cursor for MemoryCursor<'_> {
    fn upsert_station(&mut self, station: &Station) -> Result<(), StoreError> {
        let prior = self.tables.stations.insert(
            station.code,
            StoredStation {
                station: station.clone(),
                active: true,
                updated_at: Utc::now(),
            },
        );
        self.undo.push(Undo::Station(station.code, prior));
        Ok(())
    }

    fn active_station_codes(&mut self) -> Result<Vec<StationCode>, StoreError> {
        Ok(self
            .tables
            .stations
            .values()
            .filter(|s| s.active)
            .map(|s| s.station.code)
            .collect())
    }

    fn deactivate_station(&mut self, code: StationCode) -> Result<bool, StoreError> {
        match self.tables.stations.get_mut(&code) {
            Some(stored) => {
                let prior = stored.clone();
                stored.active = false;
                self.undo.push(Undo::Station(code, Some(prior)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn measurement_exists(
        &mut self,
        station: StationCode,
        source_timestamp: i64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .measurements
            .contains_key(&(station, source_timestamp)))
    }

    fn insert_measurement(&mut self, measurement: &Measurement) -> Result<(), StoreError> {
        let key = (measurement.station, measurement.source_timestamp);
        if self.tables.measurements.contains_key(&key) {
            return Err(StoreError::Constraint(format!(
                "measurement ({}, {}) already exists",
                key.0, key.1
            )));
        }
        self.tables.measurements.insert(key, measurement.clone());
        self.undo.push(Undo::Measurement(key));
        Ok(())
    }

    fn find_forecast(&mut self, zone: &str, date: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tables
            .forecasts
            .iter()
            .find(|(_, f)| f.zone == zone && f.date == date)
            .map(|(id, _)| *id))
    }

    fn update_forecast(&mut self, id: i64, entry: &ForecastEntry) -> Result<(), StoreError> {
        let row = self
            .tables
            .forecasts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Query(format!("forecast row {} not found", id)))?;
        let prior = row.clone();

        row.issued = entry.issued.clone();
        row.temp_max = entry.temp_max;
        row.temp_min = entry.temp_min;
        row.rain_dawn = entry.rain_dawn.clone();
        row.rain_morning = entry.rain_morning.clone();
        row.rain_afternoon = entry.rain_afternoon.clone();
        row.rain_night = entry.rain_night.clone();
        self.undo.push(Undo::Forecast(id, Some(prior)));
        Ok(())
    }

    fn insert_forecast(&mut self, entry: &ForecastEntry) -> Result<(), StoreError> {
        let exists = self
            .tables
            .forecasts
            .values()
            .any(|f| f.zone == entry.zone && f.date == entry.date);
        if exists {
            return Err(StoreError::Constraint(format!(
                "forecast ({}, {}) already exists",
                entry.zone, entry.date
            )));
        }

        let prior_id = self.tables.next_forecast_id;
        let id = prior_id + 1;
        self.tables.next_forecast_id = id;
        self.tables.forecasts.insert(id, entry.clone());
        self.undo.push(Undo::NextForecastId(prior_id));
        self.undo.push(Undo::Forecast(id, None));
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::unit_of_work;
    use chrono::NaiveDate;

    fn station(code: StationCode, name: &str) -> Station {
        Station {
            code,
            name: name.to_string(),
            latitude: Some(6.25),
            longitude: Some(-75.56),
            city: "Medellín".into(),
            comuna: String::new(),
            subcuenca: String::new(),
            barrio: String::new(),
            valor: 0.0,
            network: "meteo".into(),
        }
    }

    fn measurement(code: StationCode, ts: i64) -> Measurement {
        Measurement {
            station: code,
            source_timestamp: ts,
            observed_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            readings: Default::default(),
            is_valid: true,
        }
    }

    #[test]
    fn test_uncommitted_cursor_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut cursor = store.cursor().unwrap();
            cursor.upsert_station(&station(1, "A")).unwrap();
            // dropped without commit
        }
        assert!(store.stations().is_empty(), "dropped cursor must not persist work");
    }

    #[test]
    fn test_committed_cursor_persists() {
        let store = MemoryStore::new();
        let mut cursor = store.cursor().unwrap();
        cursor.upsert_station(&station(1, "A")).unwrap();
        cursor.commit().unwrap();

        assert_eq!(store.stations().len(), 1);
        assert!(store.station(1).unwrap().active);
    }

    #[test]
    fn test_unit_of_work_rolls_back_on_error() {
        let store = MemoryStore::new();
        let result: Result<(), StoreError> = unit_of_work(&store, |cursor| {
            cursor.insert_measurement(&measurement(5, 100))?;
            cursor.insert_measurement(&measurement(5, 100))?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Constraint(_))));
        assert!(store.measurements().is_empty(), "first insert rolled back too");
    }

    #[test]
    fn test_upsert_reactivates_deactivated_station() {
        let store = MemoryStore::new();
        unit_of_work::<_, StoreError, _>(&store, |c| {
            c.upsert_station(&station(9, "Old"))?;
            c.deactivate_station(9)
        })
        .unwrap();
        assert!(!store.station(9).unwrap().active);

        unit_of_work::<_, StoreError, _>(&store, |c| c.upsert_station(&station(9, "New")))
            .unwrap();
        let stored = store.station(9).unwrap();
        assert!(stored.active);
        assert_eq!(stored.station.name, "New");
    }

    fn forecast(zone: &str, max: i32) -> ForecastEntry {
        ForecastEntry {
            zone: zone.into(),
            date: "2024-01-01".into(),
            issued: "2024-01-01 06:00".into(),
            temp_max: max,
            temp_min: 17,
            rain_dawn: "Baja".into(),
            rain_morning: "Baja".into(),
            rain_afternoon: "Alta".into(),
            rain_night: "Media".into(),
        }
    }

    #[test]
    fn test_rollback_restores_updated_rows_and_keeps_earlier_units() {
        let store = MemoryStore::new();
        unit_of_work::<_, StoreError, _>(&store, |c| {
            c.upsert_station(&station(1, "Kept"))?;
            c.insert_measurement(&measurement(1, 100))?;
            c.insert_forecast(&forecast("bello", 30))
        })
        .unwrap();
        let id = store.forecasts()[0].id;

        {
            let mut cursor = store.cursor().unwrap();
            cursor.upsert_station(&station(1, "Renamed")).unwrap();
            cursor.deactivate_station(1).unwrap();
            cursor.upsert_station(&station(2, "New")).unwrap();
            cursor.insert_measurement(&measurement(1, 200)).unwrap();
            cursor.update_forecast(id, &forecast("bello", 35)).unwrap();
            cursor.insert_forecast(&forecast("itagui", 28)).unwrap();
            // dropped without commit
        }

        let kept = store.station(1).unwrap();
        assert_eq!(kept.station.name, "Kept", "upsert undone");
        assert!(kept.active, "deactivation undone");
        assert!(store.station(2).is_none(), "new station removed");
        assert_eq!(store.measurements_for(1).len(), 1, "only the committed reading survives");
        assert_eq!(store.forecasts_for("bello")[0].temp_max, 30, "update undone");
        assert!(store.forecasts_for("itagui").is_empty(), "insert undone");

        unit_of_work::<_, StoreError, _>(&store, |c| c.insert_forecast(&forecast("itagui", 28)))
            .unwrap();
        assert_eq!(
            store.forecasts().iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![id, id + 1],
            "rolled-back insert gives its id back"
        );
    }

    #[test]
    fn test_unavailable_store_refuses_cursors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.cursor(), Err(StoreError::Pool(_))));
        store.set_unavailable(false);
        assert!(store.cursor().is_ok());
    }
}
