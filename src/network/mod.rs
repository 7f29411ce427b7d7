//! Ledger network access
//!
//! - [`endpoint`]: static endpoint configuration
//! - [`envelope`]: MessagePack wire format
//! - [`connection`]: persistent WebSocket connections with reconnect
//! - [`client`]: proposals and broadcasts
//! - [`events`]: commit event subscriptions
//!
//! Controllers see the network only through [`LedgerClient`] and
//! [`EventSource`]; a [`Connector`] builds both for a controller's endpoints.

pub mod client;
pub mod connection;
pub mod endpoint;
pub mod envelope;
pub mod events;

pub use client::{LedgerClient, WsLedgerClient};
pub use connection::{EndpointConnection, SharedConnection};
pub use endpoint::{Endpoint, EndpointConfig, NetworkProfile, TlsMaterial};
pub use events::{CommitEvent, EventSource, Subscription, SubscriptionId, WsEventSource};

use std::sync::Arc;
use std::time::Duration;

/// Builds the network collaborators of one controller.
///
/// Must not perform network I/O; connections open on first use.
pub trait Connector: Send + Sync {
    fn ledger_client(&self, endpoints: &EndpointConfig) -> Arc<dyn LedgerClient>;
    fn event_source(&self, endpoints: &EndpointConfig) -> Arc<dyn EventSource>;
}

/// Connector for the WebSocket transport
#[derive(Debug, Clone)]
pub struct WsConnector {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Connector for WsConnector {
    fn ledger_client(&self, endpoints: &EndpointConfig) -> Arc<dyn LedgerClient> {
        Arc::new(WsLedgerClient::new(
            endpoints,
            self.connect_timeout,
            self.request_timeout,
        ))
    }

    fn event_source(&self, _endpoints: &EndpointConfig) -> Arc<dyn EventSource> {
        Arc::new(WsEventSource::new())
    }
}
