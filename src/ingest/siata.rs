/// SIATA open data API: URL construction and JSON payload parsing.
///
/// Three documents are consumed, all under the same base URL:
///   - `PluviometricaMeteo.json` - station list `{ estaciones: [...], red }`
///   - `wrf<zone>.json`          - zone forecast `{ date, pronostico: [...] }`
///   - `<codigo>.json`           - live reading `{ date, t, h, p, ws, wd, p10m, p1h, p24h }`
///
/// SIATA is loose with types: codes, timestamps and sensor values arrive
/// either as JSON numbers or as numeric strings, so every field is read
/// through `serde_json::Value` and coerced here.

use log::warn;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{ForecastEntry, SensorReadings, Station, StationCode};

/// Sensor sentinel for "no data".
pub const NO_DATA_SENTINEL: f64 = -999.0;

/// Any sensor value below this is treated as "no data" as well.
pub const NO_DATA_FLOOR: f64 = -900.0;

/// Network label assumed when the station list omits `red`.
pub const DEFAULT_NETWORK: &str = "meteo";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("unexpected document shape: {0}")]
    Shape(String),
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid {field} {raw:?}")]
    InvalidNumber { field: &'static str, raw: String },
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Live reading document for one station.
pub fn station_reading_url(base_url: &str, code: StationCode) -> String {
    format!("{}{}.json", base_url, code)
}

/// WRF forecast document for one zone.
pub fn zone_forecast_url(base_url: &str, zone: &str) -> String {
    format!("{}wrf{}.json", base_url, zone)
}

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

/// Reads a JSON number or numeric string as `f64`. NaN and infinities
/// (including overflowing literals such as "1e400") read as absent.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Reads a JSON string, number or null as text. Null becomes empty.
fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_field(object: &Value, key: &str) -> String {
    object.get(key).map(value_as_text).unwrap_or_default()
}

/// Cleans one raw sensor value.
///
/// Returns `None` for missing, non-numeric or non-finite input, the -999
/// sentinel, and anything below -900; the parsed number otherwise.
pub fn clean_sensor_value(raw: Option<&Value>) -> Option<f64> {
    raw.and_then(value_as_f64)
        .filter(|v| *v != NO_DATA_SENTINEL && *v >= NO_DATA_FLOOR)
}

fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then(|| value as i64)
}

/// Parses a station code given as number or numeric string. Integral
/// floats (`82.0`, `"82.0"`) are accepted.
pub fn parse_station_code(value: &Value) -> Option<StationCode> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Station list
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StationListDocument {
    #[serde(default)]
    estaciones: Vec<Value>,
    #[serde(default)]
    red: Option<Value>,
}

/// Parsed station list: usable stations plus the entries that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct StationList {
    pub network: String,
    pub stations: Vec<Station>,
    /// Entries without a usable `codigo`.
    pub skipped: usize,
}

pub fn parse_station_list(document: &Value) -> Result<StationList, PayloadError> {
    let parsed: StationListDocument = serde_json::from_value(document.clone())
        .map_err(|e| PayloadError::Shape(e.to_string()))?;

    let network = parsed
        .red
        .as_ref()
        .map(value_as_text)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_NETWORK.to_string());

    let mut stations = Vec::with_capacity(parsed.estaciones.len());
    let mut skipped = 0;

    for entry in &parsed.estaciones {
        let raw_code = entry.get("codigo");
        let Some(code) = raw_code.and_then(parse_station_code) else {
            match raw_code {
                Some(raw) => warn!("skipping station entry with unusable codigo {}", raw),
                None => warn!("skipping station entry without codigo"),
            }
            skipped += 1;
            continue;
        };

        stations.push(Station {
            code,
            name: text_field(entry, "nombre"),
            latitude: entry.get("latitud").and_then(value_as_f64),
            longitude: entry.get("longitud").and_then(value_as_f64),
            city: text_field(entry, "ciudad"),
            comuna: text_field(entry, "comuna"),
            subcuenca: text_field(entry, "subcuenca"),
            barrio: text_field(entry, "barrio"),
            valor: entry.get("valor").and_then(value_as_f64).unwrap_or(0.0),
            network: network.clone(),
        });
    }

    Ok(StationList {
        network,
        stations,
        skipped,
    })
}

// ---------------------------------------------------------------------------
// Live reading
// ---------------------------------------------------------------------------

/// A live reading with its epoch parsed and sensors cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReading {
    pub source_timestamp: i64,
    pub readings: SensorReadings,
}

/// Parses the embedded `date` epoch. Fractional seconds are truncated.
pub fn parse_epoch(raw: Option<&Value>) -> Result<i64, PayloadError> {
    let raw = match raw {
        None | Some(Value::Null) => return Err(PayloadError::MissingTimestamp),
        Some(v) => v,
    };

    let text = value_as_text(raw);
    if text.trim().is_empty() {
        return Err(PayloadError::MissingTimestamp);
    }

    value_as_f64(raw)
        .filter(|secs| secs.abs() < i64::MAX as f64)
        .map(|secs| secs.trunc() as i64)
        .ok_or(PayloadError::InvalidTimestamp(text))
}

pub fn parse_live_reading(document: &Value) -> Result<LiveReading, PayloadError> {
    if !document.is_object() {
        return Err(PayloadError::Shape("live reading is not a JSON object".into()));
    }

    let source_timestamp = parse_epoch(document.get("date"))?;
    let sensor = |key: &str| clean_sensor_value(document.get(key));

    Ok(LiveReading {
        source_timestamp,
        readings: SensorReadings {
            temperature: sensor("t"),
            humidity: sensor("h"),
            pressure: sensor("p"),
            wind_speed: sensor("ws"),
            wind_direction: sensor("wd"),
            precip_10m: sensor("p10m"),
            precip_1h: sensor("p1h"),
            precip_24h: sensor("p24h"),
        },
    })
}

// ---------------------------------------------------------------------------
// Zone forecast
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ForecastDocument {
    #[serde(default)]
    date: Value,
    #[serde(default)]
    pronostico: Vec<Value>,
}

/// Parsed zone forecast: one entry per dated day, plus undated entries skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneForecast {
    pub issued: String,
    pub entries: Vec<ForecastEntry>,
    pub skipped: usize,
}

/// Temperatures are stored as whole degrees; missing means 0.
fn temperature_field(entry: &Value, field: &'static str) -> Result<i32, PayloadError> {
    match entry.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(raw) => value_as_f64(raw)
            .filter(|t| t.abs() < i32::MAX as f64)
            .map(|t| t.trunc() as i32)
            .ok_or_else(|| PayloadError::InvalidNumber {
                field,
                raw: value_as_text(raw),
            }),
    }
}

pub fn parse_zone_forecast(zone: &str, document: &Value) -> Result<ZoneForecast, PayloadError> {
    let parsed: ForecastDocument = serde_json::from_value(document.clone())
        .map_err(|e| PayloadError::Shape(e.to_string()))?;

    let issued = value_as_text(&parsed.date);
    let mut entries = Vec::with_capacity(parsed.pronostico.len());
    let mut skipped = 0;

    for day in &parsed.pronostico {
        let date = text_field(day, "fecha");
        if date.trim().is_empty() {
            skipped += 1;
            continue;
        }

        entries.push(ForecastEntry {
            zone: zone.to_string(),
            date,
            issued: issued.clone(),
            temp_max: temperature_field(day, "temperatura_maxima")?,
            temp_min: temperature_field(day, "temperatura_minima")?,
            rain_dawn: text_field(day, "lluvia_madrugada"),
            rain_morning: text_field(day, "lluvia_mannana"),
            rain_afternoon: text_field(day, "lluvia_tarde"),
            rain_night: text_field(day, "lluvia_noche"),
        });
    }

    Ok(ZoneForecast {
        issued,
        entries,
        skipped,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
