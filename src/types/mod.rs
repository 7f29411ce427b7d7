//! Shared types

pub mod error;
pub mod transaction;

pub use error::{GatewayError, Result};
pub use transaction::{
    BroadcastAck, CommitOutcome, EndorsedTransaction, InvokeOutcome, ProposalResponse,
    ProposalResult, TransactionId, TransactionRequest,
};
