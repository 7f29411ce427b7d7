//! Error types for the loyalty gateway
//!
//! Every fatal outcome of the transaction protocol has its own variant so the
//! HTTP boundary can tell "write rejected" apart from "write accepted but
//! confirmation unknown" (the latter is not an error at all, see
//! `CommitOutcome::TimedOut`).

use hyper::StatusCode;

/// Main error type for gateway operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Unauthenticated identity: {0}")]
    Unauthenticated(String),

    #[error("Endorsement rejected with status {status}: {message}")]
    EndorsementRejected {
        status: i32,
        message: String,
        payload: Vec<u8>,
    },

    #[error("Proposal returned no endorsement responses")]
    NoEndorsement,

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Commit event subscription failed: {0}")]
    Subscription(String),

    #[error("Query returned {0} responses, expected exactly one")]
    UnsupportedFanIn(usize),

    #[error("Query failed with status {status}: {message}")]
    QueryFailed { status: i32, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity store error: {0}")]
    Identity(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::EndorsementRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoEndorsement => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Broadcast(_) => StatusCode::BAD_GATEWAY,
            Self::Subscription(_) => StatusCode::BAD_GATEWAY,
            Self::UnsupportedFanIn(_) => StatusCode::BAD_GATEWAY,
            Self::QueryFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Identity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Certificate(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::EndorsementRejected { .. } => "ENDORSEMENT_REJECTED",
            Self::NoEndorsement => "NO_ENDORSEMENT",
            Self::Broadcast(_) => "BROADCAST_FAILED",
            Self::Subscription(_) => "SUBSCRIPTION_FAILED",
            Self::UnsupportedFanIn(_) => "UNSUPPORTED_FAN_IN",
            Self::QueryFailed { .. } => "QUERY_FAILED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Identity(_) => "IDENTITY_STORE_ERROR",
            Self::Certificate(_) => "CERTIFICATE_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for GatewayError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Internal(format!("MessagePack encode error: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for GatewayError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Network(format!("MessagePack decode error: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
