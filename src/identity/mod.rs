//! Enrolled identities
//!
//! - [`IdentityStore`]: where enrolled credentials live (a directory on disk by default)
//! - [`IdentitySession`]: per-controller cache that resolves one identity at most once
//! - [`certificate`]: certificate field extraction for the identity view

pub mod certificate;
pub mod session;
pub mod store;

pub use certificate::CertificateFields;
pub use session::IdentitySession;
pub use store::FileIdentityStore;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;

use crate::types::{GatewayError, Result};

/// An enrolled identity: certificate, signing key and MSP membership
#[derive(Clone)]
pub struct Identity {
    name: String,
    msp_id: String,
    /// PEM-encoded enrollment certificate
    certificate: String,
    signing_key: Option<SigningKey>,
}

impl Identity {
    pub fn new(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        certificate: impl Into<String>,
        signing_key: Option<SigningKey>,
    ) -> Self {
        Self {
            name: name.into(),
            msp_id: msp_id.into(),
            certificate: certificate.into(),
            signing_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// Enrolled means we hold both a certificate and the key that signs for it
    pub fn is_enrolled(&self) -> bool {
        !self.certificate.trim().is_empty() && self.signing_key.is_some()
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing_key.as_ref().map(SigningKey::verifying_key)
    }

    /// Sign a message with the identity's key
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| GatewayError::Unauthenticated(format!("{} has no signing key", self.name)))?;
        Ok(key.sign(message).to_bytes().to_vec())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("msp_id", &self.msp_id)
            .field("enrolled", &self.is_enrolled())
            .finish()
    }
}

/// Source of enrolled identities
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the identity stored for `user`, `Ok(None)` if there is none
    async fn lookup(&self, user: &str) -> Result<Option<Identity>>;

    /// Whether the identity may sign proposals
    fn is_enrolled(&self, identity: &Identity) -> bool {
        identity.is_enrolled()
    }
}
