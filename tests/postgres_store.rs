/// PostgreSQL store against a live database.
///
/// Prerequisites:
/// - PostgreSQL running, DATABASE_URL set in .env
/// - sql/001_initial_schema.sql applied
///
/// Test rows use station codes >= 990000 and zone "test_zone" and are
/// removed before and after each test.
///
/// Run with: cargo test --test postgres_store -- --ignored --test-threads=1

use chrono::NaiveDate;
use postgres::{Client, NoTls};
use siata_etl::db::{self, PgStore};
use siata_etl::model::{ForecastEntry, Measurement, SensorReadings, Station};
use siata_etl::store::{unit_of_work, Store, StoreError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const TEST_CODE: i64 = 990_001;
const TEST_ZONE: &str = "test_zone";

fn setup_test_db() -> Client {
    dotenv::dotenv().ok();
    let url = db::database_url().expect("DATABASE_URL must be set");
    Client::connect(&url, NoTls).expect("Failed to connect to test database")
}

fn cleanup_test_data(client: &mut Client) {
    let _ = client.execute("DELETE FROM mediciones WHERE estacion_codigo >= 990000", &[]);
    let _ = client.execute("DELETE FROM estaciones WHERE codigo >= 990000", &[]);
    let _ = client.execute("DELETE FROM pronosticos WHERE zona = $1", &[&TEST_ZONE]);
}

fn test_station(name: &str) -> Station {
    Station {
        code: TEST_CODE,
        name: name.to_string(),
        latitude: Some(6.25),
        longitude: Some(-75.56),
        city: "Medellín".into(),
        comuna: "Test".into(),
        subcuenca: String::new(),
        barrio: String::new(),
        valor: 0.0,
        network: "meteo".into(),
    }
}

fn test_measurement(epoch: i64) -> Measurement {
    Measurement {
        station: TEST_CODE,
        source_timestamp: epoch,
        observed_at: NaiveDate::from_ymd_opt(2023, 11, 14)
            .unwrap()
            .and_hms_opt(22, 13, 20)
            .unwrap(),
        readings: SensorReadings {
            humidity: Some(55.0),
            ..Default::default()
        },
        is_valid: true,
    }
}

fn test_forecast(max: i32) -> ForecastEntry {
    ForecastEntry {
        zone: TEST_ZONE.into(),
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

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_upsert_reactivates_and_updates_station() {
    let mut client = setup_test_db();
    cleanup_test_data(&mut client);
    let store = PgStore::connect(2).expect("store should connect");

    unit_of_work::<_, StoreError, _>(&store, |c| {
        c.upsert_station(&test_station("Old"))?;
        c.deactivate_station(TEST_CODE).map(|_| ())
    })
    .unwrap();
    unit_of_work::<_, StoreError, _>(&store, |c| c.upsert_station(&test_station("New")))
        .unwrap();

    let row = client
        .query_one(
            "SELECT nombre, activa FROM estaciones WHERE codigo = $1",
            &[&TEST_CODE],
        )
        .unwrap();
    assert_eq!(row.get::<_, String>(0), "New");
    assert!(row.get::<_, bool>(1), "upsert forces active = true");

    cleanup_test_data(&mut client);
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_duplicate_measurement_is_constraint_error_and_rolls_back() {
    let mut client = setup_test_db();
    cleanup_test_data(&mut client);
    let store = PgStore::connect(2).expect("store should connect");

    unit_of_work::<_, StoreError, _>(&store, |c| {
        c.upsert_station(&test_station("Dup"))?;
        c.insert_measurement(&test_measurement(1_700_000_000))
    })
    .unwrap();

    let result = unit_of_work::<_, StoreError, _>(&store, |c| {
        c.insert_measurement(&test_measurement(1_700_000_600))?;
        c.insert_measurement(&test_measurement(1_700_000_000))
    });
    assert!(
        matches!(result, Err(StoreError::Constraint(_))),
        "unique violation should map to Constraint, got {:?}",
        result
    );

    let count: i64 = client
        .query_one(
            "SELECT COUNT(*) FROM mediciones WHERE estacion_codigo = $1",
            &[&TEST_CODE],
        )
        .unwrap()
        .get(0);
    assert_eq!(count, 1, "the failed unit left nothing behind");

    let mut cursor = store.cursor().unwrap();
    assert!(cursor.measurement_exists(TEST_CODE, 1_700_000_000).unwrap());
    assert!(!cursor.measurement_exists(TEST_CODE, 1_700_000_600).unwrap());
    drop(cursor);

    cleanup_test_data(&mut client);
}

// ---------------------------------------------------------------------------
// Forecasts
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_forecast_find_update_insert() {
    let mut client = setup_test_db();
    cleanup_test_data(&mut client);
    let store = PgStore::connect(2).expect("store should connect");

    unit_of_work::<_, StoreError, _>(&store, |c| c.insert_forecast(&test_forecast(30))).unwrap();
    let id = unit_of_work::<_, StoreError, _>(&store, |c| c.find_forecast(TEST_ZONE, "2024-01-01"))
        .unwrap()
        .expect("inserted row should be found");
    unit_of_work::<_, StoreError, _>(&store, |c| c.update_forecast(id, &test_forecast(32)))
        .unwrap();

    let rows = client
        .query(
            "SELECT temperatura_maxima FROM pronosticos WHERE zona = $1",
            &[&TEST_ZONE],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, i32>(0), 32);

    cleanup_test_data(&mut client);
}
