/// Test fixtures: representative SIATA payloads.
///
/// Trimmed to the fields the parsers read, but typed the way SIATA sends
/// them: codes and sensor values mix JSON numbers and numeric strings, and
/// `date` on a live reading is epoch seconds as a string.

use serde_json::{json, Value};

/// Station list with a numeric code, a string code, a code-less entry
/// (skipped) and a minimal entry.
pub(crate) fn fixture_station_list() -> Value {
    json!({
        "red": "meteo_siata",
        "estaciones": [
            {
                "codigo": 82,
                "nombre": "Torre SIATA",
                "latitud": 6.2593,
                "longitud": -75.5887,
                "ciudad": "Medellín",
                "comuna": "La Candelaria",
                "subcuenca": "Q. Santa Elena",
                "barrio": "Centro",
                "valor": 0
            },
            {
                "codigo": "201",
                "nombre": "I.E. Fe y Alegría",
                "latitud": "6.3371",
                "longitud": "-75.5553",
                "ciudad": "Bello",
                "comuna": "Niquía",
                "subcuenca": "Q. La García",
                "barrio": "Niquía",
                "valor": "3.5"
            },
            {
                "nombre": "Sin código",
                "latitud": 6.1,
                "longitud": -75.6
            },
            {
                "codigo": 999,
                "nombre": "Estación retirada"
            }
        ]
    })
}

/// Live reading with one sentinel (`t`), one non-numeric (`wd`) and one
/// missing (`p1h`) sensor.
pub(crate) fn fixture_live_reading() -> Value {
    json!({
        "date": "1700000000",
        "t": "-999",
        "h": "55",
        "p": 850.2,
        "ws": "1.3",
        "wd": "--",
        "p10m": "0",
        "p24h": "12.7"
    })
}

/// Zone forecast with two days; the second omits `temperatura_minima`
/// and `lluvia_noche`.
pub(crate) fn fixture_zone_forecast() -> Value {
    json!({
        "date": "2024-01-01 06:00",
        "pronostico": [
            {
                "fecha": "2024-01-01",
                "temperatura_maxima": "30",
                "temperatura_minima": 17.8,
                "lluvia_madrugada": "Baja",
                "lluvia_mannana": "Media",
                "lluvia_tarde": "Alta",
                "lluvia_noche": "Baja"
            },
            {
                "fecha": "2024-01-02",
                "temperatura_maxima": 28,
                "lluvia_madrugada": "Baja",
                "lluvia_mannana": "Baja",
                "lluvia_tarde": "Media"
            }
        ]
    })
}
