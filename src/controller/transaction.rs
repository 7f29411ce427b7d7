//! Transaction controller
//!
//! One controller per (user, channel). It owns the identity session and the
//! network bindings for that channel and drives the query and invoke paths:
//!
//! ```text
//! invoke:  resolve ─▶ propose ─▶ endorsement gate ─┬─▶ broadcast ───┐
//!                                                  └─▶ await commit ┴─▶ join
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::commit::CommitWaiter;
use crate::identity::{CertificateFields, IdentitySession, IdentityStore};
use crate::network::{EndpointConfig, EventSource, LedgerClient};
use crate::types::{
    EndorsedTransaction, GatewayError, InvokeOutcome, ProposalResult, Result, TransactionId,
    TransactionRequest,
};

/// Query and invoke operations bound to one channel and identity
pub struct Controller {
    user: String,
    endpoints: EndpointConfig,
    identities: Arc<dyn IdentityStore>,
    session: IdentitySession,
    ledger: Arc<dyn LedgerClient>,
    commits: CommitWaiter,
}

impl Controller {
    /// Build a controller. Performs no network I/O.
    pub fn new(
        user: impl Into<String>,
        endpoints: EndpointConfig,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn LedgerClient>,
        events: Arc<dyn EventSource>,
        commit_timeout: Duration,
    ) -> Self {
        Self {
            user: user.into(),
            endpoints,
            session: IdentitySession::new(Arc::clone(&identities)),
            identities,
            ledger,
            commits: CommitWaiter::new(events, commit_timeout),
        }
    }

    /// User this controller was created for
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn channel(&self) -> &str {
        &self.endpoints.channel
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    /// Evaluate a read-only request.
    ///
    /// Returns the single response payload unchanged, or `None` when the
    /// network returned no responses at all.
    pub async fn query(&self, user: &str, request: &TransactionRequest) -> Result<Option<Vec<u8>>> {
        let identity = self.session.resolve(user).await?;
        debug!(
            user = %user,
            channel = %self.endpoints.channel,
            chaincode = %request.chaincode_id,
            fcn = %request.fcn,
            "Submitting query"
        );

        let mut responses = self
            .ledger
            .propose_query(&identity, &self.endpoints.channel, request)
            .await?;

        match responses.len() {
            0 => {
                info!(fcn = %request.fcn, "No payloads were returned from query");
                Ok(None)
            }
            1 => {
                let response = responses.remove(0);
                if response.is_success() {
                    Ok(Some(response.payload))
                } else {
                    warn!(
                        fcn = %request.fcn,
                        status = response.status,
                        message = %response.message,
                        "Query returned an error response"
                    );
                    Err(GatewayError::QueryFailed {
                        status: response.status,
                        message: response.message,
                    })
                }
            }
            n => Err(GatewayError::UnsupportedFanIn(n)),
        }
    }

    /// Submit a write: endorse, then broadcast while waiting for the commit.
    ///
    /// A broadcast failure is returned even when the commit wait succeeded.
    /// A commit timeout is not an error; it comes back as
    /// [`CommitOutcome::TimedOut`](crate::types::CommitOutcome::TimedOut).
    pub async fn invoke(&self, user: &str, request: &TransactionRequest) -> Result<InvokeOutcome> {
        let identity = self.session.resolve(user).await?;

        let tx_id = TransactionId::generate(identity.msp_id(), identity.certificate());
        info!(
            user = %user,
            channel = %self.endpoints.channel,
            chaincode = %request.chaincode_id,
            fcn = %request.fcn,
            tx_id = %tx_id,
            "Submitting transaction proposal"
        );

        let proposal = self
            .ledger
            .propose_transaction(&identity, &self.endpoints.channel, request, &tx_id)
            .await?;
        let endorsed = endorsement_gate(proposal, &tx_id)?;
        debug!(tx_id = %tx_id, endorsements = endorsed.responses.len(), "Proposal endorsed");

        let broadcast = async {
            self.ledger
                .broadcast(&identity, endorsed)
                .await
                .map_err(|e| match e {
                    GatewayError::Broadcast(_) => e,
                    other => GatewayError::Broadcast(other.to_string()),
                })
        };
        let commit = self.commits.await_commit(&self.endpoints.events, &tx_id);

        let (broadcast, commit) = tokio::join!(broadcast, commit);
        let broadcast = broadcast.inspect_err(|e| {
            warn!(tx_id = %tx_id, error = %e, "Broadcast failed");
        })?;
        let commit = commit?;

        info!(
            tx_id = %tx_id,
            broadcast = %broadcast.status,
            committed = commit.is_resolved(),
            "Transaction settled"
        );
        Ok(InvokeOutcome { broadcast, commit })
    }

    /// Certificate fields of `user`'s stored identity; no network call
    pub async fn view_identity(&self, user: &str) -> Result<CertificateFields> {
        let identity = self
            .identities
            .lookup(user)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("No stored identity for {}", user)))?;
        CertificateFields::from_pem(identity.certificate())
    }
}

/// Accept the proposal only if its first response is a success
fn endorsement_gate(result: ProposalResult, tx_id: &TransactionId) -> Result<EndorsedTransaction> {
    let Some(first) = result.responses.first() else {
        warn!(tx_id = %tx_id, "Proposal returned no endorsements");
        return Err(GatewayError::NoEndorsement);
    };

    if !first.is_success() {
        warn!(
            tx_id = %tx_id,
            status = first.status,
            message = %first.message,
            "Endorsement rejected"
        );
        return Err(GatewayError::EndorsementRejected {
            status: first.status,
            message: first.message.clone(),
            payload: first.payload.clone(),
        });
    }

    Ok(EndorsedTransaction {
        tx_id: tx_id.clone(),
        proposal: result.proposal,
        responses: result.responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProposalResponse;

    fn rejected(status: i32) -> ProposalResponse {
        ProposalResponse {
            status,
            message: "chaincode error".into(),
            payload: b"customer exists".to_vec(),
        }
    }

    #[test]
    fn test_gate_accepts_success() {
        let tx_id = TransactionId::from_raw("abc");
        let endorsed = endorsement_gate(
            ProposalResult {
                responses: vec![ProposalResponse::ok(b"ok".to_vec())],
                proposal: vec![1, 2, 3],
            },
            &tx_id,
        )
        .unwrap();
        assert_eq!(endorsed.tx_id, tx_id);
        assert_eq!(endorsed.proposal, vec![1, 2, 3]);
    }

    #[test]
    fn test_gate_surfaces_first_rejection() {
        let err = endorsement_gate(
            ProposalResult {
                responses: vec![rejected(500), ProposalResponse::ok(b"ok".to_vec())],
                proposal: Vec::new(),
            },
            &TransactionId::from_raw("abc"),
        )
        .unwrap_err();
        match err {
            GatewayError::EndorsementRejected { status, payload, .. } => {
                assert_eq!(status, 500);
                assert_eq!(payload, b"customer exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_gate_only_inspects_first_response() {
        let endorsed = endorsement_gate(
            ProposalResult {
                responses: vec![ProposalResponse::ok(b"ok".to_vec()), rejected(500)],
                proposal: Vec::new(),
            },
            &TransactionId::from_raw("abc"),
        );
        assert!(endorsed.is_ok());
    }

    #[test]
    fn test_gate_rejects_empty_set() {
        let err = endorsement_gate(
            ProposalResult {
                responses: Vec::new(),
                proposal: Vec::new(),
            },
            &TransactionId::from_raw("abc"),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::NoEndorsement));
    }
}
