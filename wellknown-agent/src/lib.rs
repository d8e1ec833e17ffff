//! Client side of the wellknown challenge protocol.
//!
//! The agent proves control of a domain by pushing a challenge/response
//! pair to the web application serving that domain, over a mutually
//! authenticated (signed-request) channel, and retracting it once the
//! certificate authority has validated.

pub mod authenticator;
pub mod error;
pub mod keystore;
pub mod protocol;
pub mod session;

pub use authenticator::{Authenticator, ChallengeKind, PendingChallenge};
pub use error::AgentError;
pub use keystore::{KeyStore, LoadedKey};
pub use protocol::{ProtocolClient, HTTP_TIMEOUT};
pub use session::Session;
