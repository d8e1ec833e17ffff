//! Plugin-shaped surface for certificate tooling.
//!
//! Wraps the protocol client in the prepare / perform / cleanup shape an
//! issuance pipeline drives: validate local state up front, publish every
//! pending challenge, then retract them all best-effort once validation is
//! over, whatever its outcome.

use crate::error::AgentError;
use crate::protocol::ProtocolClient;
use crate::session::Session;

/// Challenge types this authenticator can satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Http01,
}

/// One challenge awaiting publication.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    /// Domain being validated; also the host the record is published on.
    pub domain: String,
    /// Challenge token, used as the record identifier.
    pub challenge: String,
    /// Key authorization the validator expects to read back.
    pub response: String,
}

pub struct Authenticator {
    client: ProtocolClient,
    session: Session,
}

impl Authenticator {
    pub fn new(client: ProtocolClient, session: Session) -> Self {
        Self { client, session }
    }

    /// Check local preconditions before any challenge work starts.
    ///
    /// # Errors
    ///
    /// Propagates key-directory validation failures so a broken setup is
    /// reported before the validator is ever contacted.
    pub fn prepare(&self) -> Result<(), AgentError> {
        self.client.keystore().validate_directory()?;
        Ok(())
    }

    #[must_use]
    pub fn preferred_challenge_types(&self) -> &'static [ChallengeKind] {
        &[ChallengeKind::Http01]
    }

    /// Publish every pending challenge, failing on the first that cannot
    /// be published.
    pub async fn perform(&mut self, challenges: &[PendingChallenge]) -> Result<(), AgentError> {
        for pending in challenges {
            self.client
                .publish(
                    &mut self.session,
                    &pending.domain,
                    &pending.challenge,
                    &pending.response,
                )
                .await?;
        }
        Ok(())
    }

    /// Retract every challenge, best-effort; always runs to the end of the
    /// list regardless of individual failures.
    pub async fn cleanup(&mut self, challenges: &[PendingChallenge]) {
        for pending in challenges {
            self.client
                .retract(&mut self.session, &pending.domain, &pending.challenge)
                .await;
        }
    }
}
