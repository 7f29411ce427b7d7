//! Commit event source
//!
//! A subscription registers interest in one transaction id and delivers
//! commit notifications (or transport errors) on a channel until it is
//! unsubscribed.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::connection::open_socket;
use super::envelope::{Envelope, EnvelopeKind, TxEvent, WireError, WireRequest};
use super::Endpoint;
use crate::types::{GatewayError, Result, TransactionId};

/// Identifier of one live subscription
pub type SubscriptionId = u64;

/// A commit notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub tx_id: String,
    pub validation_code: Option<String>,
    pub block_number: Option<u64>,
}

impl From<TxEvent> for CommitEvent {
    fn from(event: TxEvent) -> Self {
        Self {
            tx_id: event.tx_id,
            validation_code: event.validation_code,
            block_number: event.block_number,
        }
    }
}

/// A registered interest in one transaction's commit
pub struct Subscription {
    pub id: SubscriptionId,
    /// Commit events, or the error that ended the subscription
    pub events: mpsc::Receiver<Result<CommitEvent>>,
}

/// Source of commit notifications
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Connect to `endpoint` and register interest in `tx_id`
    async fn subscribe(&self, endpoint: &Endpoint, tx_id: &TransactionId) -> Result<Subscription>;

    /// Remove a registration; unknown ids are ignored
    async fn unsubscribe(&self, id: SubscriptionId);
}

/// Live subscription bookkeeping
struct ActiveSubscription {
    tx_id: String,
    outbound: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

/// WebSocket event source: one socket per subscription
pub struct WsEventSource {
    subscriptions: DashMap<SubscriptionId, ActiveSubscription>,
    next_id: AtomicU64,
}

impl WsEventSource {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of registrations currently live
    pub fn active(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for WsEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(&self, endpoint: &Endpoint, tx_id: &TransactionId) -> Result<Subscription> {
        info!(endpoint = %endpoint.url(), tx_id = %tx_id, "Opening commit event subscription");

        let ws = open_socket(endpoint)
            .await
            .map_err(|e| GatewayError::Subscription(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let register = WireRequest::RegisterTx {
            tx_id: tx_id.to_string(),
        };
        let frame = Envelope::request(0, &register)?.encode()?;
        sink.send(Message::Binary(frame))
            .await
            .map_err(|e| GatewayError::Subscription(format!("Failed to register: {}", e)))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(4);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => match outbound {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if let Err(e) = sink.send(msg).await {
                                debug!("Event socket send failed: {}", e);
                                break;
                            }
                            if closing {
                                break;
                            }
                        }
                        None => break,
                    },
                    inbound = stream.next() => match inbound {
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(item) = decode_event(&data) {
                                if events_tx.send(item).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let _ = events_tx
                                .send(Err(GatewayError::Subscription(format!(
                                    "Event source closed the connection: {:?}",
                                    frame
                                ))))
                                .await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events_tx.send(Err(GatewayError::Subscription(e.to_string()))).await;
                            break;
                        }
                        None => {
                            let _ = events_tx
                                .send(Err(GatewayError::Subscription("Event stream ended".into())))
                                .await;
                            break;
                        }
                    },
                }
            }
        });

        self.subscriptions.insert(
            id,
            ActiveSubscription {
                tx_id: tx_id.to_string(),
                outbound: outbound_tx,
                task,
            },
        );

        Ok(Subscription { id, events: events_rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let Some((_, active)) = self.subscriptions.remove(&id) else {
            return;
        };
        debug!(tx_id = %active.tx_id, "Unregistering commit event subscription");

        let unregister = WireRequest::UnregisterTx {
            tx_id: active.tx_id.clone(),
        };
        let sent = match Envelope::request(0, &unregister).and_then(|e| e.encode()) {
            Ok(frame) => {
                active.outbound.send(Message::Binary(frame)).await.is_ok()
                    && active.outbound.send(Message::Close(None)).await.is_ok()
            }
            Err(_) => false,
        };

        if !sent {
            active.task.abort();
        }
    }
}

/// Decode one inbound frame; `None` for frames that are not for us
fn decode_event(data: &[u8]) -> Option<Result<CommitEvent>> {
    let envelope = match Envelope::decode(data) {
        Ok(e) => e,
        Err(e) => return Some(Err(GatewayError::Subscription(format!("Malformed event: {}", e)))),
    };

    match envelope.kind {
        EnvelopeKind::Event => Some(
            envelope
                .payload::<TxEvent>()
                .map(CommitEvent::from)
                .map_err(|e| GatewayError::Subscription(format!("Malformed event: {}", e))),
        ),
        EnvelopeKind::Error => {
            let message = envelope
                .payload::<WireError>()
                .map(|e| e.message)
                .unwrap_or_else(|_| "unknown event source error".into());
            Some(Err(GatewayError::Subscription(message)))
        }
        EnvelopeKind::Response => None,
        EnvelopeKind::Request => {
            warn!("Event source sent a request envelope, ignoring");
            None
        }
    }
}
