//! Authentication error types.

/// Reasons a signed request fails verification.
///
/// These are ordinary negative results, not exceptional conditions; the
/// authorization gate folds them into a deny decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthnError {
    /// The header (or a field being signed) is structurally invalid.
    #[error("malformed authorization header")]
    Malformed,

    /// The timestamp falls outside the freshness window, in either direction.
    #[error("signature freshness window exceeded")]
    Expired,

    /// No public keys are registered for the claimed username.
    #[error("unknown user")]
    UnknownUser,

    /// No registered key verifies the signature.
    #[error("no matching key")]
    NoMatchingKey,

    /// The nonce has been seen before within the retention window.
    #[error("replay detected")]
    Replayed,
}
