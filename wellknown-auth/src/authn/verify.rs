//! Verification of signed requests.

use crate::identity::PublicKey;

use super::error::AuthnError;
use super::header::{build_canonical_message, RequestContext, SignedHeader};

/// Default freshness window, in seconds, applied symmetrically around the
/// server's clock. The replay cache should retain nonces for at least twice
/// this long.
pub const DEFAULT_MAX_SKEW_SECS: i64 = 300;

/// Trait for replay detection.
///
/// # Thread Safety
///
/// Uses `&self` to allow concurrent access. Implementations should use
/// interior mutability (e.g., `Mutex`, `DashMap`).
///
/// # Atomicity
///
/// `check_and_insert` MUST be atomic: the check and the insert happen as a
/// single logical operation, or two concurrent requests carrying the same
/// nonce could both pass.
///
/// # Retention
///
/// Entries should be retained for at least `2 * max_skew_seconds` to cover
/// replays at the edge of the validity window.
pub trait ReplayCache: Send + Sync {
    /// Check if the nonce is new for this username and record it atomically.
    ///
    /// Returns `true` if the nonce was new and has been recorded, `false`
    /// if this is a replay.
    fn check_and_insert(&self, username: &str, nonce: &[u8; 16], timestamp: i64) -> bool;
}

/// Result of successful verification.
///
/// The constructor is crate-private so a `VerifiedRequest` can only come out
/// of [`verify_v1`], which performs the cryptographic checks. This prevents
/// accidental authentication bypasses downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest(String);

impl VerifiedRequest {
    pub(crate) fn new(username: String) -> Self {
        Self(username)
    }

    /// The verified username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.0
    }

    /// Consume and return the username.
    #[must_use]
    pub fn into_username(self) -> String {
        self.0
    }
}

/// Verify a signed request against the claimed user's registered keys.
///
/// Checks, in order: timestamp freshness, key registration, signature
/// validity against each candidate key, and nonce uniqueness. The replay
/// check runs last so that invalid signatures cannot pollute the cache and
/// lock out a legitimate retry.
///
/// # Errors
///
/// - `Expired` if the timestamp is outside `±max_skew_seconds` of `now`
/// - `UnknownUser` if `candidate_keys` is empty
/// - `NoMatchingKey` if no candidate key verifies the signature
/// - `Replayed` if the nonce has been seen before
#[must_use = "verification result must be checked"]
pub fn verify_v1(
    header: &SignedHeader,
    ctx: &RequestContext<'_>,
    now_utc_seconds: i64,
    max_skew_seconds: i64,
    candidate_keys: &[PublicKey],
    replay_cache: &impl ReplayCache,
) -> Result<VerifiedRequest, AuthnError> {
    // Saturating arithmetic handles extreme timestamps (i64::MIN/MAX).
    let age = now_utc_seconds.saturating_sub(header.timestamp);
    let future_age = header.timestamp.saturating_sub(now_utc_seconds);
    if age > max_skew_seconds || future_age > max_skew_seconds {
        return Err(AuthnError::Expired);
    }

    // Cheap registration check before the expensive signature verification.
    if candidate_keys.is_empty() {
        return Err(AuthnError::UnknownUser);
    }

    let message = build_canonical_message(header.timestamp, &header.nonce, &header.username, ctx)?;

    // A user may have several registered keys; any one of them authorizes
    // the request. PublicKey::verify is constant-time per key.
    if !candidate_keys
        .iter()
        .any(|key| key.verify(&message, &header.signature))
    {
        return Err(AuthnError::NoMatchingKey);
    }

    if !replay_cache.check_and_insert(&header.username, &header.nonce, header.timestamp) {
        return Err(AuthnError::Replayed);
    }

    Ok(VerifiedRequest::new(header.username.clone()))
}
