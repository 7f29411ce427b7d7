//! WebSocket transport integration tests
//!
//! A controller built by the real connector drives loopback peer, orderer
//! and event servers speaking the MessagePack envelope protocol.

mod common;

use futures_util::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

use common::{create_customer, MockIdentityStore};
use loyalty_gateway::controller::ControllerRegistry;
use loyalty_gateway::network::envelope::{
    encode, Envelope, EnvelopeKind, QueryReply, TxEvent, WireRequest,
};
use loyalty_gateway::network::{Endpoint, NetworkProfile, WsConnector};
use loyalty_gateway::types::{
    BroadcastAck, CommitOutcome, ProposalResponse, ProposalResult, TransactionRequest,
};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn bind() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::plain(listener.local_addr().unwrap().to_string());
    (listener, endpoint)
}

/// Peer or orderer: answers every request on one connection
async fn ledger_server<F>(answer: F) -> Endpoint
where
    F: Fn(WireRequest) -> Vec<u8> + Send + 'static,
{
    let (listener, endpoint) = bind().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Binary(data) = msg {
                let request = Envelope::decode(&data).unwrap();
                let reply = Envelope {
                    id: request.id,
                    kind: EnvelopeKind::Response,
                    data: answer(request.payload().unwrap()),
                };
                ws.send(Message::Binary(reply.encode().unwrap())).await.unwrap();
            }
        }
    });
    endpoint
}

/// Event source: commits whatever gets registered, returns the requests it saw
async fn event_server(commit: bool) -> (Endpoint, JoinHandle<(Vec<WireRequest>, bool)>) {
    let (listener, endpoint) = bind().await;
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let mut requests = Vec::new();
        let mut closed = false;
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Binary(data) => {
                    let request: WireRequest = Envelope::decode(&data).unwrap().payload().unwrap();
                    let register = match &request {
                        WireRequest::RegisterTx { tx_id } if commit => Some(tx_id.clone()),
                        _ => None,
                    };
                    if let Some(tx_id) = register {
                        let event = Envelope {
                            id: 0,
                            kind: EnvelopeKind::Event,
                            data: encode(&TxEvent {
                                tx_id,
                                validation_code: Some("VALID".into()),
                                block_number: Some(11),
                            })
                            .unwrap(),
                        };
                        ws.send(Message::Binary(event.encode().unwrap())).await.unwrap();
                    }
                    requests.push(request);
                }
                Message::Close(_) => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }
        (requests, closed)
    });
    (endpoint, handle)
}

fn endorsing_peer(request: WireRequest) -> Vec<u8> {
    match request {
        WireRequest::ProposeTransaction(signed) => encode(&ProposalResult {
            responses: vec![ProposalResponse::ok(Vec::new())],
            proposal: signed.proposal,
        })
        .unwrap(),
        WireRequest::ProposeQuery(_) => encode(&QueryReply {
            responses: vec![ProposalResponse::ok(b"{\"id\":\"123456789\"}".to_vec())],
        })
        .unwrap(),
        other => panic!("peer got {:?}", other),
    }
}

fn accepting_orderer(request: WireRequest) -> Vec<u8> {
    match request {
        WireRequest::Broadcast(_) => encode(&BroadcastAck {
            status: "SUCCESS".into(),
            info: String::new(),
        })
        .unwrap(),
        other => panic!("orderer got {:?}", other),
    }
}

fn registry(
    peer: Endpoint,
    orderer: Endpoint,
    events: Endpoint,
    commit_timeout: Duration,
) -> ControllerRegistry {
    let profile = NetworkProfile {
        peer,
        orderer,
        events,
        store_path: PathBuf::from("/tmp/hfc-key-store"),
    };
    let connector = Arc::new(WsConnector {
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
    });
    ControllerRegistry::new(profile, MockIdentityStore::enrolled(), connector)
        .with_commit_timeout(commit_timeout)
}

#[tokio::test]
async fn test_invoke_commits_over_websockets() {
    let peer = ledger_server(endorsing_peer).await;
    let orderer = ledger_server(accepting_orderer).await;
    let (events, event_log) = event_server(true).await;

    let registry = registry(peer, orderer, events, TIMEOUT);
    let controller = registry.get_instance("user1", "mychannel");

    let outcome = timeout(TIMEOUT, controller.invoke("user1", &create_customer()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.broadcast.status, "SUCCESS");
    let tx_id = match outcome.commit {
        CommitOutcome::Resolved {
            tx_id,
            validation_code,
            block_number,
        } => {
            assert_eq!(validation_code.as_deref(), Some("VALID"));
            assert_eq!(block_number, Some(11));
            tx_id
        }
        other => panic!("expected a commit, got {:?}", other),
    };

    // Registered once, unregistered once, then closed
    let (requests, closed) = timeout(TIMEOUT, event_log).await.unwrap().unwrap();
    assert!(closed);
    assert_eq!(requests.len(), 2);
    assert!(matches!(&requests[0], WireRequest::RegisterTx { tx_id: t } if *t == tx_id));
    assert!(matches!(&requests[1], WireRequest::UnregisterTx { tx_id: t } if *t == tx_id));
}

#[tokio::test]
async fn test_invoke_times_out_and_unregisters_over_websockets() {
    let peer = ledger_server(endorsing_peer).await;
    let orderer = ledger_server(accepting_orderer).await;
    let (events, event_log) = event_server(false).await;

    let registry = registry(peer, orderer, events, Duration::from_millis(300));
    let controller = registry.get_instance("user1", "mychannel");

    let outcome = timeout(TIMEOUT, controller.invoke("user1", &create_customer()))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome.commit, CommitOutcome::TimedOut { .. }));

    let (requests, closed) = timeout(TIMEOUT, event_log).await.unwrap().unwrap();
    assert!(closed);
    let unregisters = requests
        .iter()
        .filter(|r| matches!(r, WireRequest::UnregisterTx { .. }))
        .count();
    assert_eq!(unregisters, 1);
}

#[tokio::test]
async fn test_query_over_websockets() {
    let peer = ledger_server(endorsing_peer).await;
    let (orderer_listener, orderer) = bind().await;
    let (events_listener, events) = bind().await;

    let registry = registry(peer, orderer, events, TIMEOUT);
    let controller = registry.get_instance("user1", "mychannel");

    let request = TransactionRequest::new("loyalty", "get_customer", ["123456789"]);
    let payload = timeout(TIMEOUT, controller.query("user1", &request))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload.as_deref(), Some(&b"{\"id\":\"123456789\"}"[..]));

    // Queries never reach the orderer or the event source
    let quiet = Duration::from_millis(100);
    assert!(timeout(quiet, orderer_listener.accept()).await.is_err());
    assert!(timeout(quiet, events_listener.accept()).await.is_err());
}
