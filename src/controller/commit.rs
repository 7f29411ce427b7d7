//! Commit event waiter
//!
//! Waits, for a bounded time, until the event source reports one transaction
//! id as committed.
//!
//! ```text
//! Connecting ──subscribed──▶ Subscribed ──matching event──▶ Resolved
//!     │                          │ ──deadline──────────▶ TimedOut
//!     │                          └─transport error─────▶ Errored
//!     ├─deadline──▶ TimedOut
//!     └─error─────▶ Errored
//! ```
//!
//! The deadline starts before the subscription is opened. Once registered,
//! the subscription is released exactly once on every exit path, including
//! when the waiting future itself is dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::network::{Endpoint, EventSource, SubscriptionId};
use crate::types::{CommitOutcome, GatewayError, Result, TransactionId};

/// Default commit-wait deadline
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(150);

/// Waits for commit notifications of single transactions
pub struct CommitWaiter {
    source: Arc<dyn EventSource>,
    timeout: Duration,
}

impl CommitWaiter {
    pub fn new(source: Arc<dyn EventSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `tx_id` is reported committed or the deadline passes.
    ///
    /// A timeout is a normal outcome ([`CommitOutcome::TimedOut`]); only
    /// subscription failures are errors.
    pub async fn await_commit(&self, endpoint: &Endpoint, tx_id: &TransactionId) -> Result<CommitOutcome> {
        let deadline = sleep_until(Instant::now() + self.timeout);
        tokio::pin!(deadline);

        // Connecting
        let subscription = tokio::select! {
            subscribed = self.source.subscribe(endpoint, tx_id) => {
                subscribed.map_err(|e| match e {
                    GatewayError::Subscription(_) => e,
                    other => GatewayError::Subscription(other.to_string()),
                })?
            }
            _ = &mut deadline => {
                warn!(tx_id = %tx_id, "Commit deadline passed while subscribing");
                return Ok(CommitOutcome::TimedOut { tx_id: tx_id.to_string() });
            }
        };

        // Subscribed
        let mut registration = Registration::new(Arc::clone(&self.source), subscription.id);
        let mut events = subscription.events;
        debug!(tx_id = %tx_id, subscription = subscription.id, "Waiting for commit event");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Ok(event)) if event.tx_id == tx_id.as_str() => {
                        registration.release().await;
                        info!(
                            tx_id = %tx_id,
                            validation_code = ?event.validation_code,
                            block = ?event.block_number,
                            "Transaction committed"
                        );
                        return Ok(CommitOutcome::Resolved {
                            tx_id: event.tx_id,
                            validation_code: event.validation_code,
                            block_number: event.block_number,
                        });
                    }
                    Some(Ok(other)) => {
                        debug!(tx_id = %tx_id, other = %other.tx_id, "Ignoring event for another transaction");
                    }
                    Some(Err(e)) => {
                        registration.release().await;
                        warn!(tx_id = %tx_id, error = %e, "Commit event subscription failed");
                        return Err(match e {
                            GatewayError::Subscription(_) => e,
                            other => GatewayError::Subscription(other.to_string()),
                        });
                    }
                    None => {
                        registration.release().await;
                        return Err(GatewayError::Subscription("Event stream closed".into()));
                    }
                },
                _ = &mut deadline => {
                    registration.release().await;
                    warn!(
                        tx_id = %tx_id,
                        timeout_secs = self.timeout.as_secs(),
                        "No commit event before deadline, outcome inconclusive"
                    );
                    return Ok(CommitOutcome::TimedOut { tx_id: tx_id.to_string() });
                }
            }
        }
    }
}

/// Scoped registration: unsubscribes exactly once
struct Registration {
    source: Arc<dyn EventSource>,
    id: Option<SubscriptionId>,
}

impl Registration {
    fn new(source: Arc<dyn EventSource>, id: SubscriptionId) -> Self {
        Self { source, id: Some(id) }
    }

    async fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.source.unsubscribe(id).await;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // Waiter dropped mid-wait: finish cleanup in the background
        if let Some(id) = self.id.take() {
            let source = Arc::clone(&self.source);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    source.unsubscribe(id).await;
                });
            }
        }
    }
}
