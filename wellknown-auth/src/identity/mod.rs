//! Cryptographic identity types.
//!
//! Ed25519 keypairs used on both sides of the challenge protocol:
//!
//! - [`PrivateKey`] - Signing key with automatic zeroization on drop
//! - [`PublicKey`] - Verification key, displayable for out-of-band registration
//! - [`Signature`] - Ed25519 signature over a canonical request message
//! - [`Fingerprint`] - SSH-compatible `SHA256:{base64_no_padding}` digest
//!
//! # Security Properties
//!
//! - Private keys are zeroized on drop to prevent lingering in memory
//! - No `Debug` implementation for `PrivateKey` prevents accidental logging
//! - Fingerprint comparison uses constant-time equality
//! - `verify_strict` is used to reject weak/small-order keys

mod keys;

pub use keys::{Fingerprint, KeyError, PrivateKey, PublicKey, SecretBytes, Signature};
