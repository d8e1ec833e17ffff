//! Signed HTTP client for the challenge endpoints.
//!
//! Every mutating request carries a `Wellknown v1` authorization header
//! binding the account name, a fresh nonce, the method, the path, and the
//! body hash under the account's Ed25519 key. Publication failures are
//! fatal; retraction failures are logged and swallowed so a half-broken
//! server never blocks an otherwise successful issuance run.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};
use wellknown_auth::authn::{sign_request_now, RequestContext};
use wellknown_auth::paths;

use crate::error::AgentError;
use crate::keystore::{registration_notice, KeyStore};
use crate::session::Session;

/// Deadline for any single request to a challenge server.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ProtocolClient {
    http: reqwest::Client,
    keystore: KeyStore,
    non_interactive: bool,
}

impl ProtocolClient {
    /// # Errors
    ///
    /// `InvalidConfig` if the HTTP client cannot be constructed.
    pub fn new(keystore: KeyStore, non_interactive: bool) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| AgentError::InvalidConfig(format!("http client: {err}")))?;
        Ok(Self {
            http,
            keystore,
            non_interactive,
        })
    }

    #[must_use]
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Publish a challenge/response pair on `domain`.
    ///
    /// Obtains IP-disclosure consent first; nothing is sent if consent is
    /// withheld. Any transport error or non-success status is fatal, since
    /// an unpublished challenge means validation cannot succeed.
    pub async fn publish(
        &self,
        session: &mut Session,
        domain: &str,
        challenge: &str,
        response: &str,
    ) -> Result<(), AgentError> {
        session.confirm_ip_disclosure()?;

        let body = serde_json::to_vec(&serde_json::json!({
            "challenge": challenge,
            "response": response,
        }))
        .map_err(|err| AgentError::PublicationFailed {
            domain: domain.to_string(),
            reason: format!("could not encode request body: {err}"),
        })?;

        let header = self.authorization_header(session, domain, "POST", paths::PUBLISH, Some(&body))?;
        let url = format!("http://{domain}{}", paths::PUBLISH);

        debug!(%domain, %challenge, "publishing challenge");
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, header)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| AgentError::PublicationFailed {
                domain: domain.to_string(),
                reason: err.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AgentError::PublicationFailed {
                domain: domain.to_string(),
                reason: format!("server answered {status}"),
            });
        }

        info!(%domain, %challenge, "challenge published");
        Ok(())
    }

    /// Retract a previously published challenge on `domain`.
    ///
    /// Best-effort: a failure is logged at warn level and otherwise ignored,
    /// leaving the stale record for the server to garbage-collect.
    pub async fn retract(&self, session: &mut Session, domain: &str, challenge: &str) {
        if let Err(err) = self.try_retract(session, domain, challenge).await {
            warn!(%domain, %challenge, error = %err, "challenge retraction failed; leaving record behind");
        }
    }

    async fn try_retract(
        &self,
        session: &mut Session,
        domain: &str,
        challenge: &str,
    ) -> Result<(), AgentError> {
        session.confirm_ip_disclosure()?;

        let path = paths::retraction(challenge);
        let header = self.authorization_header(session, domain, "DELETE", &path, None)?;
        let url = format!("http://{domain}{path}");

        debug!(%domain, %challenge, "retracting challenge");
        let resp = self
            .http
            .delete(&url)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|err| AgentError::PublicationFailed {
                domain: domain.to_string(),
                reason: err.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AgentError::PublicationFailed {
                domain: domain.to_string(),
                reason: format!("server answered {status}"),
            });
        }
        Ok(())
    }

    /// Sign one request for `domain`, loading (or creating) its key.
    ///
    /// When a key is generated here, the registration notice goes to stderr
    /// so the operator sees it even when stdout is captured.
    fn authorization_header(
        &self,
        session: &Session,
        domain: &str,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<String, AgentError> {
        let loaded = self.keystore.load_or_create(domain, self.non_interactive)?;
        if loaded.newly_generated {
            eprintln!(
                "{}",
                registration_notice(
                    domain,
                    session.username(),
                    &self.keystore.key_path(domain),
                    &loaded.key.public_key(),
                )
            );
        }

        let ctx = RequestContext::new(method, path, body);
        Ok(sign_request_now(session.username(), &loaded.key, &ctx)?)
    }
}
