/// siata_etl: weather-station ingestion service for the SIATA open data API.
///
/// # Module structure
///
/// ```text
/// siata_etl
/// ├── model        - shared data types (Station, Measurement, ForecastEntry, CollectOutcome)
/// ├── config       - EtlConfig loader (defaults → etl.toml → environment)
/// ├── freshness    - clock seam, fixed UTC-5 provider offset, reading age classification
/// ├── ingest
/// │   ├── fetch    - resilient HTTP GET with bounded retries and exponential backoff
/// │   ├── siata    - SIATA URL construction + payload parsing + sensor cleaning
/// │   └── fixtures (test only) - representative API response payloads
/// ├── store        - scoped cursor contract + in-memory implementation
/// ├── db           - PostgreSQL store (connection validation, pool, cursors)
/// ├── stations     - station registry sync (upsert by code, force active)
/// ├── measurements - per-station live reading collection + sweep summary
/// ├── forecast     - per-zone WRF forecast upsert
/// ├── daemon       - full collection cycle orchestration
/// ├── scheduler    - periodic jobs on a worker pool (coalesce, no overlap)
/// └── endpoint     - liveness HTTP endpoint
/// ```

pub mod config;
pub mod daemon;
pub mod db;
pub mod endpoint;
pub mod forecast;
pub mod freshness;
pub mod ingest;
pub mod measurements;
pub mod model;
pub mod scheduler;
pub mod stations;
pub mod store;
