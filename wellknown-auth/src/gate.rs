//! Server-side authorization gate for the challenge resource.
//!
//! Maps an incoming request to an allow/deny decision before any storage
//! CRUD runs. The gate is framework-independent: the HTTP layer hands it
//! the raw header and request context, and a [`KeyRegistry`] supplies the
//! registered keys and standing for the claimed username.
//!
//! A valid signature is necessary but not sufficient: the principal must
//! also be trusted (administrative standing) and hold an explicit
//! capability grant for the requested operation.

use crate::authn::{verify_v1, AuthnError, ReplayCache, RequestContext, SignedHeader};
use crate::identity::PublicKey;

/// Operations on the challenge resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Resolution by the certificate authority's validator; never signed.
    Read,
}

/// Explicit per-operation grants attached to a principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl CapabilitySet {
    /// Grant everything a publishing agent needs.
    #[must_use]
    pub fn full() -> Self {
        Self {
            create: true,
            update: true,
            delete: true,
        }
    }

    /// Whether this set grants the given operation.
    #[must_use]
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Read => true,
        }
    }
}

/// A named principal as the registry knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    /// Administrative standing; required for every mutating operation.
    pub trusted: bool,
    pub capabilities: CapabilitySet,
}

/// A principal together with its registered public keys.
///
/// A user may register several keys; any one of them authorizes a request.
#[derive(Debug, Clone)]
pub struct RegisteredPrincipal {
    pub principal: Principal,
    pub keys: Vec<PublicKey>,
}

/// Lookup of registered principals, supplied by the storage collaborator.
///
/// Implementations must be `Send + Sync`; the gate is shared across
/// concurrent requests.
pub trait KeyRegistry: Send + Sync {
    /// Resolve a claimed username, or `None` if the user is unknown.
    fn lookup(&self, username: &str) -> Option<RegisteredPrincipal>;
}

/// Why a request was denied.
///
/// Surfaced to the HTTP layer for logging only; responses stay generic so
/// a probing client cannot learn which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Mutating request without an `Authorization` header.
    MissingHeader,
    Malformed,
    Expired,
    UnknownUser,
    NoMatchingKey,
    Replayed,
    /// Signature verified, but the principal is untrusted or lacks the
    /// capability grant for this operation.
    InsufficientPermission,
}

/// Outcome of an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Request is allowed. `username` is `None` for unauthenticated reads.
    Allow { username: Option<String> },
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

impl From<AuthnError> for DenyReason {
    fn from(err: AuthnError) -> Self {
        match err {
            AuthnError::Malformed => DenyReason::Malformed,
            AuthnError::Expired => DenyReason::Expired,
            AuthnError::UnknownUser => DenyReason::UnknownUser,
            AuthnError::NoMatchingKey => DenyReason::NoMatchingKey,
            AuthnError::Replayed => DenyReason::Replayed,
        }
    }
}

/// The decision point in front of challenge storage.
pub struct Gate<C: ReplayCache> {
    max_skew_seconds: i64,
    replay_cache: C,
}

impl<C: ReplayCache> Gate<C> {
    pub fn new(max_skew_seconds: i64, replay_cache: C) -> Self {
        Self {
            max_skew_seconds,
            replay_cache,
        }
    }

    /// Decide whether `operation` may proceed.
    ///
    /// `header` is the raw `Authorization` value, if the request carried
    /// one; `ctx` describes the request as actually received.
    pub fn authorize(
        &self,
        operation: Operation,
        header: Option<&str>,
        ctx: &RequestContext<'_>,
        now_utc_seconds: i64,
        registry: &impl KeyRegistry,
    ) -> Decision {
        // The resolution endpoint serves the already-published response
        // value to a validator that has no credentials.
        if operation == Operation::Read {
            return Decision::Allow { username: None };
        }

        let Some(header) = header else {
            return Decision::Deny(DenyReason::MissingHeader);
        };

        let parsed = match SignedHeader::parse(header) {
            Ok(parsed) => parsed,
            Err(err) => return Decision::Deny(err.into()),
        };

        let Some(registered) = registry.lookup(&parsed.username) else {
            return Decision::Deny(DenyReason::UnknownUser);
        };

        let verified = match verify_v1(
            &parsed,
            ctx,
            now_utc_seconds,
            self.max_skew_seconds,
            &registered.keys,
            &self.replay_cache,
        ) {
            Ok(verified) => verified,
            Err(err) => return Decision::Deny(err.into()),
        };

        let principal = &registered.principal;
        if !principal.trusted || !principal.capabilities.allows(operation) {
            return Decision::Deny(DenyReason::InsufficientPermission);
        }

        Decision::Allow {
            username: Some(verified.into_username()),
        }
    }
}
