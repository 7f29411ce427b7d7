//! Liveness endpoint
//!
//! `/health` returns 200 while the process is running. Ledger connectivity
//! is not probed; connections open lazily on the first request.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    /// Controllers created so far
    pub controllers: usize,
    pub default_channel: String,
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        controllers: state.registry.len(),
        default_channel: state.args.default_channel.clone(),
    };
    json_response(StatusCode::OK, &response)
}
