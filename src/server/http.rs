//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::controller::ControllerRegistry;
use crate::routes::{self, not_found_response, preflight_response, LedgerParams};
use crate::types::{GatewayError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Controllers keyed by (user, channel)
    pub registry: Arc<ControllerRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, registry: Arc<ControllerRegistry>) -> Self {
        Self {
            args,
            registry,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server on the configured address
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Loyalty gateway listening on {}", state.args.listen);
    serve(listener, state).await
}

/// Accept connections on `listener` until the task is dropped
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            debug!("[{}] {} {}", addr, req.method(), req.uri().path());
                            Ok::<_, hyper::Error>(handle_request(state, req).await)
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route one HTTP request
pub async fn handle_request<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    info!("{} {}", method, path);

    match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(state),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/api/viewca") => {
            routes::handle_viewca(state, LedgerParams::from_query(&query)).await
        }

        (Method::GET, "/api/query") => {
            routes::handle_query(state, LedgerParams::from_query(&query)).await
        }

        (Method::GET, "/api/invoke") => {
            routes::handle_invoke(state, LedgerParams::from_query(&query)).await
        }

        (Method::POST, "/api/invoke") => match read_json_params(req).await {
            Ok(params) => routes::handle_invoke(state, params).await,
            Err(e) => routes::error_response(&e),
        },

        _ => not_found_response(&path),
    }
}

async fn read_json_params<B>(req: Request<B>) -> Result<LedgerParams>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Invalid body: {}", e)))?
        .to_bytes();
    LedgerParams::from_json(&body)
}
