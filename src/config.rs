/// Collector configuration loader.
///
/// Settings come from three layers, later layers winning:
/// 1. built-in defaults (the production SIATA endpoints and cadences),
/// 2. an optional TOML file (`ETL_CONFIG`, or `etl.toml` in the working
///    directory when present),
/// 3. environment variables, including anything in `.env`.
///
/// Retry count, backoff base and HTTP timeout are process-wide: every fetch
/// in the service reads them from the same `EtlConfig`.

use log::LevelFilter;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::StationCode;

const DEFAULT_CONFIG_PATH: &str = "etl.toml";

/// SIATA publishes one WRF forecast document per zone of the Aburrá valley.
pub const DEFAULT_ZONES: &[&str] = &[
    "sabaneta",
    "palmitas",
    "medOriente",
    "medOccidente",
    "medCentro",
    "laestrella",
    "itagui",
    "girardota",
    "envigado",
    "copacabana",
    "caldas",
    "bello",
    "barbosa",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete runtime configuration for the collector and its scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Maximum fetch attempts per request (`ETL_MAX_RETRIES`).
    pub max_retries: u32,
    /// Retry delay is `backoff_base^(attempt-1)` seconds (`ETL_BACKOFF_BASE`).
    pub backoff_base: f64,
    /// Timeout for list and forecast requests (`ETL_HTTP_TIMEOUT`).
    pub http_timeout_secs: u64,
    /// Timeout for per-station live reading requests.
    pub station_timeout_secs: u64,
    /// `LOG_LEVEL`: debug, info, warning, error, critical.
    pub log_level: String,

    pub base_url: String,
    /// Station list URL; derived from `base_url` when unset.
    pub stations_url: Option<String>,
    pub zones: Vec<String>,
    /// Station code known never to exist upstream; deactivated on not-found.
    pub sentinel_station: StationCode,

    pub slow_interval_secs: u64,
    pub fast_interval_secs: u64,
    pub initial_fast_delay_secs: u64,
    pub workers: usize,
    pub misfire_grace_secs: u64,

    /// Port for the liveness endpoint; disabled when unset.
    pub endpoint_port: Option<u16>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 1.5,
            http_timeout_secs: 30,
            station_timeout_secs: 10,
            log_level: "info".to_string(),
            base_url: "https://siata.gov.co/data/siata_app/".to_string(),
            stations_url: None,
            zones: DEFAULT_ZONES.iter().map(|z| z.to_string()).collect(),
            sentinel_station: 999,
            slow_interval_secs: 600,
            fast_interval_secs: 30,
            initial_fast_delay_secs: 5,
            workers: 8,
            misfire_grace_secs: 30,
            endpoint_port: None,
        }
    }
}

impl EtlConfig {
    /// Loads defaults, the optional TOML file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = env::var("ETL_CONFIG").ok().map(PathBuf::from).or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        });

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file; keys it omits keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides through `lookup` so tests never touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ETL_MAX_RETRIES") {
            self.max_retries = parse_env("ETL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ETL_BACKOFF_BASE") {
            self.backoff_base = parse_env("ETL_BACKOFF_BASE", &v)?;
        }
        if let Some(v) = lookup("ETL_HTTP_TIMEOUT") {
            self.http_timeout_secs = parse_env("ETL_HTTP_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("ETL_STATION_TIMEOUT") {
            self.station_timeout_secs = parse_env("ETL_STATION_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("ETL_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("ETL_STATIONS_URL") {
            self.stations_url = Some(v);
        }
        if let Some(v) = lookup("ETL_ENDPOINT_PORT") {
            self.endpoint_port = Some(parse_env("ETL_ENDPOINT_PORT", &v)?);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_base must be a non-negative number, got {}",
                self.backoff_base
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.slow_interval_secs == 0 || self.fast_interval_secs == 0 {
            return Err(ConfigError::Invalid("job intervals must be positive".into()));
        }
        if self.zones.iter().any(|z| z.trim().is_empty()) {
            return Err(ConfigError::Invalid("zone names must not be empty".into()));
        }
        Ok(())
    }

    pub fn stations_url(&self) -> String {
        self.stations_url
            .clone()
            .unwrap_or_else(|| format!("{}PluviometricaMeteo.json", self.base_url))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn station_timeout(&self) -> Duration {
        Duration::from_secs(self.station_timeout_secs)
    }

    /// Maps `LOG_LEVEL` to a filter. Unknown names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => LevelFilter::Trace,
            "DEBUG" => LevelFilter::Debug,
            "INFO" => LevelFilter::Info,
            "WARN" | "WARNING" => LevelFilter::Warn,
            "ERROR" | "CRITICAL" => LevelFilter::Error,
            "OFF" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
