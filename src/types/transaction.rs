//! Value types that flow through the transaction protocol

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Status code the network uses for a successful endorsement
pub const STATUS_OK: i32 = 200;

/// Nonce length used when deriving transaction ids
const NONCE_LEN: usize = 24;

/// A chaincode call: which chaincode, which function, which arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub chaincode_id: String,
    pub fcn: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl TransactionRequest {
    pub fn new(
        chaincode_id: impl Into<String>,
        fcn: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            fcn: fcn.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identifier correlating one invoke's broadcast with its commit event.
///
/// Derived as `hex(sha256(nonce || msp_id || certificate))` with a fresh random
/// nonce, so two invokes never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId {
    id: String,
    nonce: Vec<u8>,
}

impl TransactionId {
    /// Generate a fresh id for the given creator
    pub fn generate(msp_id: &str, certificate: &str) -> Self {
        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut hasher = Sha256::new();
        hasher.update(&nonce);
        hasher.update(msp_id.as_bytes());
        hasher.update(certificate.as_bytes());
        let id = hex::encode(hasher.finalize());

        Self { id, nonce }
    }

    /// Rebuild an id received from the network (no nonce known)
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nonce: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One endorsing peer's answer to a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl ProposalResponse {
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status: STATUS_OK,
            message: String::new(),
            payload: payload.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Endorsement responses plus the opaque proposal they endorse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResult {
    pub responses: Vec<ProposalResponse>,
    #[serde(default)]
    pub proposal: Vec<u8>,
}

/// An endorsed proposal ready for the ordering service
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    pub tx_id: TransactionId,
    pub proposal: Vec<u8>,
    pub responses: Vec<ProposalResponse>,
}

/// Ordering service acknowledgement: accepted for ordering, not yet committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    pub status: String,
    #[serde(default)]
    pub info: String,
}

/// Whether a commit was observed before the deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The event source reported the transaction in a block
    #[serde(rename = "committed")]
    Resolved {
        tx_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        validation_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_number: Option<u64>,
    },
    /// No matching event before the deadline. Inconclusive, not a failure.
    TimedOut { tx_id: String },
}

impl CommitOutcome {
    pub fn tx_id(&self) -> &str {
        match self {
            Self::Resolved { tx_id, .. } | Self::TimedOut { tx_id } => tx_id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Combined result of a successful invoke
#[derive(Debug, Clone, Serialize)]
pub struct InvokeOutcome {
    pub broadcast: BroadcastAck,
    pub commit: CommitOutcome,
}
