//! Pure authentication library for wellknown challenge publication.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! Collaborators are injected via traits:
//! - [`authn::ReplayCache`] - Nonce tracking for replay prevention
//! - [`gate::KeyRegistry`] - Registered public keys and standing per username
//!
//! # Example
//!
//! ```ignore
//! use wellknown_auth::{identity::PrivateKey, authn::*};
//!
//! // Agent signs a request
//! let key = PrivateKey::generate();
//! let header = sign_request_now("deployer", &key, &RequestContext { /* ... */ })?;
//!
//! // Server verifies it
//! let parsed = SignedHeader::parse(&header)?;
//! let verified = verify_v1(&parsed, &ctx, now, 300, &keys, &replay_cache)?;
//! ```

pub mod authn;
pub mod gate;
pub mod identity;
pub mod paths;

pub use authn::{
    sign_request, sign_request_now, verify_v1, AuthnError, LruReplayCache, ReplayCache,
    RequestContext, SignedHeader, VerifiedRequest, DEFAULT_MAX_SKEW_SECS,
};
pub use gate::{
    CapabilitySet, Decision, DenyReason, Gate, KeyRegistry, Operation, Principal,
    RegisteredPrincipal,
};
pub use identity::{Fingerprint, KeyError, PrivateKey, PublicKey, Signature};
