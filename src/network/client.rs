//! Ledger client - proposals to the peer, broadcasts to the orderer

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::connection::SharedConnection;
use super::envelope::{
    self, Broadcast, Creator, Proposal, QueryReply, SignedBroadcast, SignedProposal, WireRequest,
};
use super::EndpointConfig;
use crate::identity::Identity;
use crate::types::{
    BroadcastAck, EndorsedTransaction, GatewayError, ProposalResponse, ProposalResult, Result,
    TransactionId, TransactionRequest,
};

/// Network operations the transaction controller drives
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a read-only proposal (no ordering, no commit)
    async fn propose_query(
        &self,
        identity: &Identity,
        channel: &str,
        request: &TransactionRequest,
    ) -> Result<Vec<ProposalResponse>>;

    /// Submit a transaction proposal for endorsement
    async fn propose_transaction(
        &self,
        identity: &Identity,
        channel: &str,
        request: &TransactionRequest,
        tx_id: &TransactionId,
    ) -> Result<ProposalResult>;

    /// Submit an endorsed transaction to the ordering service
    async fn broadcast(
        &self,
        identity: &Identity,
        transaction: EndorsedTransaction,
    ) -> Result<BroadcastAck>;
}

/// WebSocket ledger client bound to one peer and one orderer
pub struct WsLedgerClient {
    peer: SharedConnection,
    orderer: SharedConnection,
    request_timeout: Duration,
}

impl WsLedgerClient {
    /// Create a client; connections open on first use
    pub fn new(endpoints: &EndpointConfig, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            peer: SharedConnection::new(endpoints.peer.clone(), connect_timeout),
            orderer: SharedConnection::new(endpoints.orderer.clone(), connect_timeout),
            request_timeout,
        }
    }

    async fn call(&self, target: &SharedConnection, request: &WireRequest) -> Result<Vec<u8>> {
        let conn = target.get().await?;
        match conn.request(request, self.request_timeout).await {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!(endpoint = %target.endpoint().address, error = %e, "Ledger request failed");
                if !conn.is_connected() {
                    target.reset().await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LedgerClient for WsLedgerClient {
    async fn propose_query(
        &self,
        identity: &Identity,
        channel: &str,
        request: &TransactionRequest,
    ) -> Result<Vec<ProposalResponse>> {
        let signed = sign_proposal(identity, channel, request, None)?;
        let data = self.call(&self.peer, &WireRequest::ProposeQuery(signed)).await?;
        let reply: QueryReply = rmp_serde::from_slice(&data)?;
        debug!(responses = reply.responses.len(), "Query proposal answered");
        Ok(reply.responses)
    }

    async fn propose_transaction(
        &self,
        identity: &Identity,
        channel: &str,
        request: &TransactionRequest,
        tx_id: &TransactionId,
    ) -> Result<ProposalResult> {
        let signed = sign_proposal(identity, channel, request, Some(tx_id))?;
        let data = self
            .call(&self.peer, &WireRequest::ProposeTransaction(signed))
            .await?;
        Ok(rmp_serde::from_slice(&data)?)
    }

    async fn broadcast(
        &self,
        identity: &Identity,
        transaction: EndorsedTransaction,
    ) -> Result<BroadcastAck> {
        let body = Broadcast {
            tx_id: transaction.tx_id.to_string(),
            proposal: transaction.proposal,
            responses: transaction.responses,
            creator: creator_of(identity),
        };
        let broadcast = envelope::encode(&body)?;
        let signature = identity.sign(&broadcast)?;

        let data = self
            .call(
                &self.orderer,
                &WireRequest::Broadcast(SignedBroadcast { broadcast, signature }),
            )
            .await
            .map_err(|e| GatewayError::Broadcast(e.to_string()))?;
        Ok(rmp_serde::from_slice(&data)?)
    }
}

fn creator_of(identity: &Identity) -> Creator {
    Creator {
        msp_id: identity.msp_id().to_string(),
        certificate: identity.certificate().to_string(),
    }
}

/// Build and sign a proposal; queries carry a fresh nonce but no transaction id
fn sign_proposal(
    identity: &Identity,
    channel: &str,
    request: &TransactionRequest,
    tx_id: Option<&TransactionId>,
) -> Result<SignedProposal> {
    let nonce = match tx_id {
        Some(id) => id.nonce().to_vec(),
        None => TransactionId::generate(identity.msp_id(), identity.certificate())
            .nonce()
            .to_vec(),
    };

    let proposal = Proposal {
        channel: channel.to_string(),
        chaincode_id: request.chaincode_id.clone(),
        fcn: request.fcn.clone(),
        args: request.args.clone(),
        tx_id: tx_id.map(|id| id.to_string()),
        nonce,
        creator: creator_of(identity),
        timestamp: chrono::Utc::now().timestamp(),
    };

    let proposal = envelope::encode(&proposal)?;
    let signature = identity.sign(&proposal)?;
    Ok(SignedProposal { proposal, signature })
}
