/// Shared data types for the collection pipeline.
///
/// These are transient, in-memory representations: every row they describe
/// is owned by the store, and nothing here outlives a single collection pass.

use chrono::NaiveDateTime;
use std::fmt;

/// SIATA station identifier (`codigo`). Numeric upstream, sometimes sent as a string.
pub type StationCode = i64;

// ---------------------------------------------------------------------------
// Station registry
// ---------------------------------------------------------------------------

/// Descriptive station metadata as published in the station list.
///
/// The active flag and update timestamp are not part of the payload; the
/// store forces `active = true` and refreshes `updated_at` on every upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub code: StationCode,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: String,
    pub comuna: String,
    pub subcuenca: String,
    pub barrio: String,
    /// Raw sensor `valor` reported alongside the metadata.
    pub valor: f64,
    /// Network label (`red`) declared by the station list payload.
    pub network: String,
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// The eight cleaned sensor channels of a live reading.
///
/// `None` means "no data": the sensor was missing, non-numeric, or reported
/// the -999 sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings {
    /// `t`: air temperature, °C.
    pub temperature: Option<f64>,
    /// `h`: relative humidity, %.
    pub humidity: Option<f64>,
    /// `p`: pressure.
    pub pressure: Option<f64>,
    /// `ws`: wind speed.
    pub wind_speed: Option<f64>,
    /// `wd`: wind direction, degrees.
    pub wind_direction: Option<f64>,
    /// `p10m`: precipitation over the last 10 minutes.
    pub precip_10m: Option<f64>,
    /// `p1h`: precipitation over the last hour.
    pub precip_1h: Option<f64>,
    /// `p24h`: precipitation over the last 24 hours.
    pub precip_24h: Option<f64>,
}

/// One persisted live reading. Insert-only; unique on
/// (`station`, `source_timestamp`).
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub station: StationCode,
    /// Epoch seconds exactly as published by the provider.
    pub source_timestamp: i64,
    /// Calendar value of `source_timestamp` on the provider's wall clock.
    pub observed_at: NaiveDateTime,
    pub readings: SensorReadings,
    pub is_valid: bool,
}

// ---------------------------------------------------------------------------
// Forecasts
// ---------------------------------------------------------------------------

/// One daily entry of a zone's WRF forecast. Unique on (`zone`, `date`).
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub zone: String,
    /// Forecast day (`fecha`) as published.
    pub date: String,
    /// Issue timestamp of the whole forecast document (`date`).
    pub issued: String,
    pub temp_max: i32,
    pub temp_min: i32,
    pub rain_dawn: String,
    pub rain_morning: String,
    pub rain_afternoon: String,
    pub rain_night: String,
}

// ---------------------------------------------------------------------------
// Collection outcomes
// ---------------------------------------------------------------------------

/// Result of collecting one station's live reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectOutcome {
    /// New reading inserted.
    Fresh,
    /// Reading is older than 2 hours but not older than 24 hours.
    Stale,
    /// Station returned not-found, or its latest reading is older than 24 hours.
    PermanentlyInactive,
    /// Reading already stored for this (station, source timestamp).
    Duplicate,
    /// Network-level failure after retries were exhausted.
    TransientError,
    /// Malformed payload or storage failure while handling the reading.
    LogicError,
}

impl CollectOutcome {
    pub const ALL: [CollectOutcome; 6] = [
        CollectOutcome::Fresh,
        CollectOutcome::Stale,
        CollectOutcome::PermanentlyInactive,
        CollectOutcome::Duplicate,
        CollectOutcome::TransientError,
        CollectOutcome::LogicError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectOutcome::Fresh => "fresh",
            CollectOutcome::Stale => "stale",
            CollectOutcome::PermanentlyInactive => "permanently_inactive",
            CollectOutcome::Duplicate => "duplicate",
            CollectOutcome::TransientError => "transient_error",
            CollectOutcome::LogicError => "logic_error",
        }
    }
}

impl fmt::Display for CollectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
