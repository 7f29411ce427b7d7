//! MessagePack wire envelopes
//!
//! Every WebSocket frame is one binary [`Envelope`]:
//!
//! ```text
//! { id: u64, type: "request" | "response" | "error" | "event", data: <bytes> }
//! ```
//!
//! `data` holds a nested MessagePack value whose shape depends on `type`:
//! a [`WireRequest`] for requests, an operation-specific reply for
//! responses, a [`WireError`] for errors and a [`TxEvent`] for events.
//! Responses and errors echo the request `id`; events use id 0.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::types::{ProposalResponse, Result};

/// Envelope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Response,
    Error,
    Event,
}

/// Outer frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn request(id: u64, request: &WireRequest) -> Result<Self> {
        Ok(Self {
            id,
            kind: EnvelopeKind::Request,
            data: rmp_serde::to_vec_named(request)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode the nested payload
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(rmp_serde::from_slice(&self.data)?)
    }
}

/// The transaction creator: MSP membership plus enrollment certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub msp_id: String,
    pub certificate: String,
}

/// Unsigned proposal body; its MessagePack encoding is what gets signed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub channel: String,
    pub chaincode_id: String,
    pub fcn: String,
    pub args: Vec<String>,
    /// Absent for read-only queries
    pub tx_id: Option<String>,
    pub nonce: Vec<u8>,
    pub creator: Creator,
    /// Unix seconds
    pub timestamp: i64,
}

/// Encoded proposal plus the creator's signature over it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Endorsed transaction submitted for ordering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub tx_id: String,
    pub proposal: Vec<u8>,
    pub responses: Vec<ProposalResponse>,
    pub creator: Creator,
}

/// Encoded broadcast plus the creator's signature over it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBroadcast {
    pub broadcast: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Operations understood by peers, orderers and event sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireRequest {
    ProposeQuery(SignedProposal),
    ProposeTransaction(SignedProposal),
    Broadcast(SignedBroadcast),
    RegisterTx { tx_id: String },
    UnregisterTx { tx_id: String },
}

/// Reply to `propose_query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReply {
    pub responses: Vec<ProposalResponse>,
}

/// Error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub kind: String,
    pub message: String,
}

/// Commit notification pushed by an event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub tx_id: String,
    #[serde(default)]
    pub validation_code: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Encode a value as a named MessagePack map
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}
