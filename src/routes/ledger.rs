//! Ledger API
//!
//! ## Routes
//!
//! - `GET /api/viewca?user=&channel=` - certificate fields of a stored identity
//! - `GET /api/query?user=&channel=&chaincode=&method=&arguments=` - raw payload
//! - `GET|POST /api/invoke` - submit a transaction and wait for its commit
//!
//! `arguments` may repeat (`arguments=a&arguments=b`, or `arguments[]=`,
//! `arguments[0]=`). Missing `user` and `channel` fall back to the
//! configured defaults.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, json_response, response};
use crate::server::AppState;
use crate::types::{GatewayError, Result, TransactionRequest};

/// Request parameters shared by the ledger routes
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerParams {
    pub user: Option<String>,
    pub channel: Option<String>,
    pub chaincode: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl LedgerParams {
    /// Parse a URL query string
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            let value = decode_component(value);
            match key.as_str() {
                "user" => params.user = non_empty(value),
                "channel" => params.channel = non_empty(value),
                "chaincode" => params.chaincode = non_empty(value),
                "method" => params.method = non_empty(value),
                k if k == "arguments" || k.starts_with("arguments[") => params.arguments.push(value),
                _ => {}
            }
        }
        params
    }

    /// Parse a JSON request body
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| GatewayError::BadRequest(format!("Invalid JSON: {}", e)))
    }

    fn user<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.user.as_deref().unwrap_or(&state.args.default_user)
    }

    fn channel<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.channel.as_deref().unwrap_or(&state.args.default_channel)
    }

    /// Build the transaction request; chaincode and method are required
    pub fn request(&self) -> Result<TransactionRequest> {
        let chaincode = self
            .chaincode
            .as_deref()
            .ok_or_else(|| GatewayError::BadRequest("Missing chaincode".into()))?;
        let method = self
            .method
            .as_deref()
            .ok_or_else(|| GatewayError::BadRequest("Missing method".into()))?;
        Ok(TransactionRequest::new(chaincode, method, self.arguments.iter().cloned()))
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Handle GET /api/viewca
pub async fn handle_viewca(state: Arc<AppState>, params: LedgerParams) -> Response<Full<Bytes>> {
    let user = params.user(&state);
    let controller = state.registry.get_instance(user, params.channel(&state));

    match controller.view_identity(user).await {
        Ok(fields) => json_response(StatusCode::OK, &fields),
        Err(e) => {
            warn!(user = %user, error = %e, "Identity view failed");
            error_response(&e)
        }
    }
}

/// Handle GET /api/query
pub async fn handle_query(state: Arc<AppState>, params: LedgerParams) -> Response<Full<Bytes>> {
    let request = match params.request() {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    let user = params.user(&state);
    let controller = state.registry.get_instance(user, params.channel(&state));

    match controller.query(user, &request).await {
        Ok(Some(payload)) => response(StatusCode::OK, Some("application/octet-stream"), payload),
        Ok(None) => response(StatusCode::NO_CONTENT, None, Bytes::new()),
        Err(e) => {
            warn!(user = %user, fcn = %request.fcn, error = %e, "Query failed");
            error_response(&e)
        }
    }
}

/// Handle GET|POST /api/invoke
pub async fn handle_invoke(state: Arc<AppState>, params: LedgerParams) -> Response<Full<Bytes>> {
    let request = match params.request() {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    let user = params.user(&state);
    let controller = state.registry.get_instance(user, params.channel(&state));

    match controller.invoke(user, &request).await {
        Ok(outcome) => {
            if !outcome.commit.is_resolved() {
                info!(
                    tx_id = %outcome.commit.tx_id(),
                    "Commit not observed in time; result is inconclusive"
                );
            }
            json_response(StatusCode::OK, &outcome)
        }
        Err(e) => {
            warn!(user = %user, fcn = %request.fcn, error = %e, "Invoke failed");
            error_response(&e)
        }
    }
}
