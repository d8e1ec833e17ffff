//! Well-known path conventions shared by both sides of the protocol.
//!
//! The request path is part of the signed canonical message, so the agent
//! and the server must agree on it byte for byte. Both build their paths
//! from here.

/// Collection endpoint challenges are published to.
pub const PUBLISH: &str = "/.well-known/challenges/";

/// Detail endpoint a published challenge is retracted from.
#[must_use]
pub fn retraction(challenge: &str) -> String {
    format!("{PUBLISH}{challenge}/")
}

/// Unauthenticated endpoint the certificate authority's validator fetches.
#[must_use]
pub fn resolution(challenge: &str) -> String {
    format!("/.well-known/acme-challenge/{challenge}")
}
