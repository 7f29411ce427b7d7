//! Shared collaborators for integration tests
//!
//! Counting in-memory stand-ins for the identity store, ledger client and
//! event source, plus a connector handing them to every controller.

#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use loyalty_gateway::controller::ControllerRegistry;
use loyalty_gateway::identity::{Identity, IdentityStore};
use loyalty_gateway::network::{
    CommitEvent, Connector, Endpoint, EndpointConfig, EventSource, LedgerClient, NetworkProfile,
    Subscription, SubscriptionId,
};
use loyalty_gateway::types::{
    BroadcastAck, EndorsedTransaction, GatewayError, ProposalResponse, ProposalResult, Result,
    TransactionId, TransactionRequest,
};

pub const COMMIT_TIMEOUT: Duration = Duration::from_secs(150);

pub fn profile() -> NetworkProfile {
    NetworkProfile {
        peer: Endpoint::plain("localhost:7051"),
        orderer: Endpoint::plain("localhost:7050"),
        events: Endpoint::plain("localhost:7053"),
        store_path: PathBuf::from("/tmp/hfc-key-store"),
    }
}

pub fn endpoints(channel: &str) -> EndpointConfig {
    profile().for_channel(channel)
}

pub fn create_customer() -> TransactionRequest {
    TransactionRequest::new("loyalty", "create_customer", ["123456789"])
}

pub fn self_signed_pem() -> String {
    rcgen::generate_simple_self_signed(vec!["user1.org1.example.com".to_string()])
        .unwrap()
        .cert
        .pem()
}

// =============================================================================
// Identity store
// =============================================================================

pub struct MockIdentityStore {
    pub lookups: AtomicUsize,
    pub delay: Duration,
    pub enrolled: bool,
    pub certificate: String,
}

impl MockIdentityStore {
    pub fn enrolled() -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            enrolled: true,
            certificate: "CERT".into(),
        })
    }

    pub fn unenrolled() -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            enrolled: false,
            certificate: "CERT".into(),
        })
    }

    pub fn with_certificate(pem: String) -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            delay: Duration::ZERO,
            enrolled: true,
            certificate: pem,
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityStore for MockIdentityStore {
    async fn lookup(&self, user: &str) -> Result<Option<Identity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if user == "ghost" {
            return Ok(None);
        }
        let key = self.enrolled.then(|| SigningKey::generate(&mut OsRng));
        Ok(Some(Identity::new(user, "Org1MSP", self.certificate.clone(), key)))
    }
}

// =============================================================================
// Ledger client
// =============================================================================

pub struct MockLedger {
    pub query_responses: Mutex<Vec<ProposalResponse>>,
    pub endorsements: Mutex<Vec<ProposalResponse>>,
    pub broadcast_error: Mutex<Option<String>>,
    pub broadcast_delay: Duration,
    pub queries: AtomicUsize,
    pub proposals: AtomicUsize,
    pub broadcasts: AtomicUsize,
    pub last_tx_id: Mutex<Option<TransactionId>>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            query_responses: Mutex::new(vec![ProposalResponse::ok(b"{\"id\":\"123456789\"}".to_vec())]),
            endorsements: Mutex::new(vec![ProposalResponse::ok(Vec::new())]),
            broadcast_error: Mutex::new(None),
            broadcast_delay: Duration::from_millis(100),
            queries: AtomicUsize::new(0),
            proposals: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
            last_tx_id: Mutex::new(None),
        })
    }

    pub fn set_query_responses(&self, responses: Vec<ProposalResponse>) {
        *self.query_responses.lock().unwrap() = responses;
    }

    pub fn set_endorsements(&self, responses: Vec<ProposalResponse>) {
        *self.endorsements.lock().unwrap() = responses;
    }

    pub fn fail_broadcast(&self, message: &str) {
        *self.broadcast_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn last_tx_id(&self) -> Option<TransactionId> {
        self.last_tx_id.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn propose_query(
        &self,
        _identity: &Identity,
        _channel: &str,
        _request: &TransactionRequest,
    ) -> Result<Vec<ProposalResponse>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.query_responses.lock().unwrap().clone())
    }

    async fn propose_transaction(
        &self,
        _identity: &Identity,
        _channel: &str,
        _request: &TransactionRequest,
        tx_id: &TransactionId,
    ) -> Result<ProposalResult> {
        self.proposals.fetch_add(1, Ordering::SeqCst);
        *self.last_tx_id.lock().unwrap() = Some(tx_id.clone());
        Ok(ProposalResult {
            responses: self.endorsements.lock().unwrap().clone(),
            proposal: b"proposal".to_vec(),
        })
    }

    async fn broadcast(
        &self,
        _identity: &Identity,
        _transaction: EndorsedTransaction,
    ) -> Result<BroadcastAck> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.broadcast_delay).await;
        let error = self.broadcast_error.lock().unwrap().clone();
        match error {
            Some(message) => Err(GatewayError::Broadcast(message)),
            None => Ok(BroadcastAck {
                status: "SUCCESS".into(),
                info: String::new(),
            }),
        }
    }
}

// =============================================================================
// Event source
// =============================================================================

/// Emits the subscribed transaction's commit event after `commit_after`,
/// or never when it is `None`.
pub struct MockEventSource {
    pub commit_after: Mutex<Option<Duration>>,
    pub failure: Mutex<Option<String>>,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl MockEventSource {
    pub fn committing_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            commit_after: Mutex::new(Some(delay)),
            failure: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            commit_after: Mutex::new(None),
            failure: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let source = Self::silent();
        *source.failure.lock().unwrap() = Some(message.to_string());
        source
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn subscribe(&self, _endpoint: &Endpoint, tx_id: &TransactionId) -> Result<Subscription> {
        let id = self.subscribes.fetch_add(1, Ordering::SeqCst) as SubscriptionId;
        let (tx, rx) = mpsc::channel(4);
        let commit_after = *self.commit_after.lock().unwrap();
        let failure = self.failure.lock().unwrap().clone();
        let tx_id = tx_id.to_string();

        tokio::spawn(async move {
            if let Some(message) = failure {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = tx.send(Err(GatewayError::Subscription(message))).await;
                return;
            }
            if let Some(delay) = commit_after {
                tokio::time::sleep(delay).await;
                let _ = tx
                    .send(Ok(CommitEvent {
                        tx_id,
                        validation_code: Some("VALID".into()),
                        block_number: Some(7),
                    }))
                    .await;
            }
            // Hold the stream open; the waiter's deadline decides
            tx.closed().await;
        });

        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, _id: SubscriptionId) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Connector
// =============================================================================

pub struct MockConnector {
    pub ledger: Arc<MockLedger>,
    pub events: Arc<MockEventSource>,
    pub built: AtomicUsize,
}

impl MockConnector {
    pub fn new(ledger: Arc<MockLedger>, events: Arc<MockEventSource>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            events,
            built: AtomicUsize::new(0),
        })
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn ledger_client(&self, _endpoints: &EndpointConfig) -> Arc<dyn LedgerClient> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.ledger.clone()
    }

    fn event_source(&self, _endpoints: &EndpointConfig) -> Arc<dyn EventSource> {
        self.events.clone()
    }
}

pub fn registry(
    identities: Arc<MockIdentityStore>,
    ledger: Arc<MockLedger>,
    events: Arc<MockEventSource>,
) -> (ControllerRegistry, Arc<MockConnector>) {
    let connector = MockConnector::new(ledger, events);
    let registry = ControllerRegistry::new(profile(), identities, connector.clone())
        .with_commit_timeout(COMMIT_TIMEOUT);
    (registry, connector)
}
