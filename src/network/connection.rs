//! Endpoint connection manager
//!
//! Maintains a persistent WebSocket connection to a peer or orderer.
//! Handles reconnection and correlates responses to requests by envelope id.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::{
    client_async,
    tungstenite::{http::Request, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::envelope::{Envelope, EnvelopeKind, WireError, WireRequest};
use super::Endpoint;
use crate::types::{GatewayError, Result};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Reply = oneshot::Sender<Result<Envelope>>;

/// Replies awaiting a response, indexed by request id
type Pending = Arc<DashMap<u64, Reply>>;

/// Outbound request queued for the connection task
struct Outbound {
    id: u64,
    frame: Vec<u8>,
    reply: Reply,
}

/// Persistent connection to one endpoint
pub struct EndpointConnection {
    address: String,
    tx: mpsc::Sender<Outbound>,
    connected: watch::Receiver<bool>,
    pending: Pending,
    next_id: AtomicU64,
}

impl EndpointConnection {
    /// Start the connection task and wait until the first connect succeeds
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Outbound>(1000);
        let (connected_tx, mut connected_rx) = watch::channel(false);
        let pending: Pending = Arc::new(DashMap::new());

        let task_endpoint = endpoint.clone();
        let task_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            connection_loop(task_endpoint, rx, connected_tx, task_pending).await;
        });

        match timeout(connect_timeout, connected_rx.wait_for(|c| *c)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                return Err(GatewayError::Network(format!(
                    "Connection task for {} ended",
                    endpoint.address
                )))
            }
            Err(_) => {
                return Err(GatewayError::Network(format!(
                    "Timeout waiting for connection to {}",
                    endpoint.address
                )))
            }
        }

        Ok(Self {
            address: endpoint.address.clone(),
            tx,
            connected: connected_rx,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a request and wait for its response payload
    pub async fn request(&self, request: &WireRequest, timeout_after: Duration) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Envelope::request(id, request)?.encode()?;
        let (reply, response_rx) = oneshot::channel();

        self.tx
            .send(Outbound { id, frame, reply })
            .await
            .map_err(|_| GatewayError::Network(format!("Connection to {} closed", self.address)))?;

        let envelope = match timeout(timeout_after, response_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(GatewayError::Network("Response channel closed".into())),
            Err(_) => {
                self.pending.remove(&id);
                warn!(
                    request = id,
                    pending = self.pending.len(),
                    "Request to {} timed out",
                    self.address
                );
                return Err(GatewayError::Network(format!(
                    "Request to {} timed out",
                    self.address
                )));
            }
        };

        match envelope.kind {
            EnvelopeKind::Response => Ok(envelope.data),
            EnvelopeKind::Error => {
                let err: WireError = envelope.payload()?;
                Err(GatewayError::Network(format!("{}: {}", err.kind, err.message)))
            }
            other => Err(GatewayError::Network(format!(
                "Unexpected {:?} envelope in reply",
                other
            ))),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    endpoint: Endpoint,
    mut rx: mpsc::Receiver<Outbound>,
    connected: watch::Sender<bool>,
    pending: Pending,
) {
    let mut reconnect_delay = Duration::from_millis(100);
    let max_reconnect_delay = Duration::from_secs(30);

    loop {
        info!("Connecting to {}", endpoint.url());

        match open_socket(&endpoint).await {
            Ok(ws) => {
                let _ = connected.send(true);
                reconnect_delay = Duration::from_millis(100);
                info!("Connected to {}", endpoint.address);

                match handle_messages(ws, &mut rx, &pending).await {
                    Ok(Session::Closed) => {
                        debug!("Request channel for {} closed, stopping", endpoint.address);
                        let _ = connected.send(false);
                        return;
                    }
                    Ok(Session::Disconnected) => {}
                    Err(e) => error!("Connection error on {}: {}", endpoint.address, e),
                }

                let _ = connected.send(false);
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", endpoint.address, e);
            }
        }

        if rx.is_closed() {
            return;
        }

        // Wait before reconnecting
        warn!("Reconnecting to {} in {:?}...", endpoint.address, reconnect_delay);
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
    }
}

/// Why a message session ended
enum Session {
    /// All request senders dropped
    Closed,
    /// Socket closed or failed
    Disconnected,
}

/// Handle messages between the request channel and the WebSocket
async fn handle_messages(
    ws: WsStream,
    rx: &mut mpsc::Receiver<Outbound>,
    pending: &Pending,
) -> Result<Session> {
    let (ws_sink, mut ws_stream) = ws.split();

    let ws_sink = Arc::new(Mutex::new(ws_sink));
    let ws_sink_for_rx = Arc::clone(&ws_sink);

    // Task to handle outgoing requests
    let request_handler = async {
        while let Some(outbound) = rx.recv().await {
            // Caller already gave up
            if outbound.reply.is_closed() {
                debug!("Dropping request {} abandoned before send", outbound.id);
                continue;
            }
            pending.insert(outbound.id, outbound.reply);

            let mut sink = ws_sink_for_rx.lock().await;
            if let Err(e) = sink.send(Message::Binary(outbound.frame)).await {
                error!("Failed to send request {}: {}", outbound.id, e);
                if let Some((_, reply)) = pending.remove(&outbound.id) {
                    let _ = reply.send(Err(GatewayError::Network(e.to_string())));
                }
                return Session::Disconnected;
            }
        }
        Session::Closed
    };

    // Task to handle responses
    let response_handler = async {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    let envelope = match Envelope::decode(&data) {
                        Ok(e) => e,
                        Err(e) => {
                            warn!("Dropping undecodable frame: {}", e);
                            continue;
                        }
                    };

                    match pending.remove(&envelope.id) {
                        Some((_, reply)) => {
                            let _ = reply.send(Ok(envelope));
                        }
                        None => warn!("Received response {} with no pending request", envelope.id),
                    }
                }
                Ok(Message::Ping(data)) => {
                    let mut sink = ws_sink.lock().await;
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(frame)) => {
                    info!("Endpoint closed connection: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        Session::Disconnected
    };

    let session = tokio::select! {
        s = request_handler => s,
        s = response_handler => s,
    };

    // Fail everything still waiting on this socket
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, reply)) = pending.remove(&id) {
            let _ = reply.send(Err(GatewayError::Network("Connection lost".into())));
        }
    }

    Ok(session)
}

/// Open a WebSocket to the endpoint, with TLS when the endpoint carries TLS material
pub(crate) async fn open_socket(endpoint: &Endpoint) -> Result<WsStream> {
    let tcp = TcpStream::connect(&endpoint.address)
        .await
        .map_err(|e| GatewayError::Network(format!("TCP connect to {} failed: {}", endpoint.address, e)))?;

    let stream = match endpoint.tls {
        None => MaybeTlsStream::Plain(tcp),
        Some(ref tls) => {
            let connector = tls_connector(&tls.pem)?;
            let server_name = rustls::pki_types::ServerName::try_from(tls.domain.clone())
                .map_err(|e| GatewayError::Config(format!("Invalid TLS server name {}: {}", tls.domain, e)))?;
            let tls_stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| GatewayError::Network(format!("TLS handshake with {} failed: {}", endpoint.address, e)))?;
            MaybeTlsStream::Rustls(tls_stream)
        }
    };

    let request = Request::builder()
        .uri(endpoint.url())
        .header("Host", &endpoint.address)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|e| GatewayError::Network(format!("Failed to build request: {}", e)))?;

    let (ws, _) = client_async(request, stream)
        .await
        .map_err(|e| GatewayError::Network(format!("WebSocket connect failed: {}", e)))?;

    Ok(ws)
}

/// TLS connector trusting only the endpoint's PEM roots
fn tls_connector(pem: &str) -> Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    let mut reader = pem.as_bytes();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| GatewayError::Config(format!("Invalid TLS PEM: {}", e)))?;
        roots
            .add(cert)
            .map_err(|e| GatewayError::Config(format!("Rejected TLS root: {}", e)))?;
    }
    if roots.is_empty() {
        return Err(GatewayError::Config("TLS PEM contains no certificates".into()));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::Config(format!("TLS configuration failed: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Lazily established connection shared by all calls of one controller
pub struct SharedConnection {
    endpoint: Endpoint,
    connect_timeout: Duration,
    /// The connection (lazily initialized)
    connection: RwLock<Option<Arc<EndpointConnection>>>,
    /// Lock to prevent concurrent connection attempts
    connecting: Mutex<()>,
}

impl SharedConnection {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            connection: RwLock::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Get or create the connection
    pub async fn get(&self) -> Result<Arc<EndpointConnection>> {
        // Fast path: check if we have a connection
        if let Some(c) = self.live().await {
            return Ok(c);
        }

        // Slow path: need to (re)connect
        let _lock = self.connecting.lock().await;

        // Double-check after acquiring lock
        if let Some(c) = self.live().await {
            return Ok(c);
        }

        let conn = Arc::new(EndpointConnection::connect(&self.endpoint, self.connect_timeout).await?);
        *self.connection.write().await = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects
    pub async fn reset(&self) {
        *self.connection.write().await = None;
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn live(&self) -> Option<Arc<EndpointConnection>> {
        let conn = self.connection.read().await;
        conn.as_ref().filter(|c| c.is_connected()).map(Arc::clone)
    }
}
