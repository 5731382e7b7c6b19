/// HTTP liveness endpoint.
///
/// Endpoints:
/// - GET /        - Service banner; also makes sure the scheduler is running
/// - GET /health  - Scheduler state and registered job ids

use log::{error, info};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::scheduler::Scheduler;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub scheduler: &'static str,
    pub jobs: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request path to a status code and JSON body.
pub fn route(url: &str, scheduler: &Scheduler) -> (u16, Value) {
    let path = url.split('?').next().unwrap_or(url);

    match path {
        "/" => {
            scheduler.ensure_started();
            (200, json!({ "message": "SIATA Data API", "status": "running" }))
        }
        "/health" => {
            let health = HealthResponse {
                status: "ok",
                scheduler: scheduler.state().as_str(),
                jobs: scheduler.job_ids(),
            };
            match serde_json::to_value(&health) {
                Ok(body) => (200, body),
                Err(e) => (500, json!({ "error": e.to_string() })),
            }
        }
        _ => (
            404,
            json!({
                "error": "Not found",
                "available_endpoints": ["/", "/health"]
            }),
        ),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Serves requests on `port` until the listener closes.
pub fn start_endpoint_server(port: u16, scheduler: Arc<Scheduler>) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!("HTTP endpoint listening on http://0.0.0.0:{}", port);

    for request in server.incoming_requests() {
        let (status, body) = route(request.url(), &scheduler);
        if let Err(e) = request.respond(create_response(status, &body)) {
            error!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(
    status_code: u16,
    json: &Value,
) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let response = tiny_http::Response::from_string(json.to_string())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
