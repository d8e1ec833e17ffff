//! Agent error taxonomy.
//!
//! Every variant except cleanup failure is fatal for the current domain's
//! validation attempt. Cleanup failures are logged and swallowed at the
//! call site, so they never appear here.

use wellknown_auth::{AuthnError, KeyError};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AgentError {
    /// Bad or missing configuration; aborts before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key directory not usable; message names the probe step that failed.
    #[error("key directory unusable: {0}")]
    StorageUnavailable(String),

    /// Non-interactive mode with no persisted key to load.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// Operator declined IP-disclosure consent; aborts the whole run.
    #[error("must agree to IP logging to proceed")]
    ConsentDenied,

    /// Publish step failed; fatal for this domain, not retried here.
    #[error("failed to publish challenge to {domain}: {reason}")]
    PublicationFailed { domain: String, reason: String },

    /// Signing or key-material failure.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),
}

impl From<KeyError> for AgentError {
    fn from(err: KeyError) -> Self {
        AgentError::CryptoFailure(err.to_string())
    }
}

impl From<AuthnError> for AgentError {
    fn from(err: AuthnError) -> Self {
        AgentError::CryptoFailure(err.to_string())
    }
}
