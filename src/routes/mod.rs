//! HTTP routes for the loyalty gateway

pub mod health;
pub mod ledger;

pub use health::health_check;
pub use ledger::{handle_invoke, handle_query, handle_viewca, LedgerParams};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::GatewayError;

/// API error body
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: &'static str,
    /// Status of the rejecting endorsement
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<i32>,
    /// Rejection payload, verbatim (lossy UTF-8)
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

/// Response with the gateway's common headers
pub(crate) fn response(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Serialize `value` as a JSON response
pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => response(status, Some("application/json"), body),
        Err(e) => error_response(&GatewayError::from(e)),
    }
}

/// Map a gateway error to its HTTP status and JSON body
pub(crate) fn error_response(err: &GatewayError) -> Response<Full<Bytes>> {
    let (status, payload) = match err {
        GatewayError::EndorsementRejected { status, payload, .. } => (
            Some(*status),
            Some(String::from_utf8_lossy(payload).into_owned()),
        ),
        GatewayError::QueryFailed { status, .. } => (Some(*status), None),
        _ => (None, None),
    };
    let body = ApiError {
        error: err.to_string(),
        code: err.code(),
        status,
        payload,
    };
    let body = serde_json::to_vec(&body)
        .unwrap_or_else(|_| br#"{"error":"Internal error","code":"INTERNAL_ERROR"}"#.to_vec());
    response(err.status_code(), Some("application/json"), body)
}

/// CORS preflight response
pub(crate) fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = response(StatusCode::OK, None, Bytes::new());
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
pub(crate) fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(&GatewayError::NotFound(format!("No route for {}", path)))
}
