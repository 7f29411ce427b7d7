//! Directory-backed identity store
//!
//! Layout (one directory per organisation):
//!
//! ```text
//! <store>/<user>                    JSON user record (certificate + key reference)
//! <store>/<signingIdentity>-priv    hex-encoded 32-byte Ed25519 seed
//! ```
//!
//! Records are written by the enrollment tooling; this store only reads them.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Identity, IdentityStore};
use crate::types::{GatewayError, Result};

/// User record as persisted by the enrollment tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub name: String,
    #[serde(rename = "mspid")]
    pub msp_id: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub enrollment_secret: String,
    pub enrollment: EnrollmentRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    /// Key reference; the private key lives in `<signing_identity>-priv`
    pub signing_identity: String,
    pub identity: CertificateRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub certificate: String,
}

/// Identity store reading enrolled users from a directory
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw user record
    pub async fn read_record(&self, user: &str) -> Result<Option<UserRecord>> {
        let file = self.user_file(user)?;
        let data = match tokio::fs::read(&file).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::Identity(format!(
                    "Failed to read {}: {}",
                    file.display(),
                    e
                )))
            }
        };

        let record = serde_json::from_slice(&data).map_err(|e| {
            GatewayError::Identity(format!("Malformed user record {}: {}", file.display(), e))
        })?;
        Ok(Some(record))
    }

    /// Persist a user record and its signing key (used by tooling and tests)
    pub async fn write(&self, record: &UserRecord, key: &SigningKey) -> Result<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(self.user_file(&record.name)?, json).await?;
        tokio::fs::write(
            self.key_file(&record.enrollment.signing_identity)?,
            hex::encode(key.to_bytes()),
        )
        .await?;
        Ok(())
    }

    async fn read_signing_key(&self, signing_identity: &str) -> Result<Option<SigningKey>> {
        let file = self.key_file(signing_identity)?;
        let encoded = match tokio::fs::read_to_string(&file).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let bytes = hex::decode(encoded.trim())
            .map_err(|e| GatewayError::Identity(format!("Malformed key {}: {}", file.display(), e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            GatewayError::Identity(format!(
                "Key {} must be 32 bytes, got {}",
                file.display(),
                bytes.len()
            ))
        })?;
        Ok(Some(SigningKey::from_bytes(&seed)))
    }

    fn user_file(&self, user: &str) -> Result<PathBuf> {
        Ok(self.path.join(safe_file_name(user)?))
    }

    fn key_file(&self, signing_identity: &str) -> Result<PathBuf> {
        Ok(self.path.join(format!("{}-priv", safe_file_name(signing_identity)?)))
    }
}

/// Reject names that would escape the store directory
fn safe_file_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(GatewayError::BadRequest(format!("Invalid identity name: {:?}", name)));
    }
    Ok(name)
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn lookup(&self, user: &str) -> Result<Option<Identity>> {
        let Some(record) = self.read_record(user).await? else {
            debug!(user = %user, store = %self.path.display(), "No identity record");
            return Ok(None);
        };

        let signing_key = self.read_signing_key(&record.enrollment.signing_identity).await?;
        if signing_key.is_none() {
            warn!(
                user = %user,
                signing_identity = %record.enrollment.signing_identity,
                "Identity record has no private key"
            );
        }

        Ok(Some(Identity::new(
            record.name,
            record.msp_id,
            record.enrollment.identity.certificate,
            signing_key,
        )))
    }
}
