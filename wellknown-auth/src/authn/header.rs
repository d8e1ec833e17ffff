//! The signed `Authorization` header: wire format and signing.
//!
//! The agent signs a canonical message covering the request it is about to
//! make; the server rebuilds the same message from the request it actually
//! received and checks the signature. Only the fields the server cannot
//! recompute travel in the header itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::identity::{PrivateKey, Signature};

use super::error::AuthnError;

/// Header value prefix, including the protocol version.
const HEADER_PREFIX: &str = "Wellknown v1.";

/// Magic preamble for signed messages (domain separation).
const AUTH_MAGIC: &[u8; 16] = b"WELLKNOWN-AUTH\x00\x00";

/// Protocol version byte for v1.
const AUTH_VERSION_V1: u8 = 0x01;

/// Maximum username length (fits in u8).
pub const MAX_USERNAME_LEN: usize = 255;

/// Maximum method length (fits in u8).
const MAX_METHOD_LEN: usize = 255;

/// Maximum path length (fits in u16).
const MAX_PATH_LEN: usize = 65535;

/// Fixed size of the header record around the variable-length username:
/// timestamp (8) + nonce (16) + username_len (1) + signature (64).
const RECORD_FIXED_LEN: usize = 8 + 16 + 1 + 64;

/// The request fields covered by a signature.
///
/// The server reconstructs this from the incoming request, so tampering
/// with any field invalidates the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext<'a> {
    /// HTTP method (e.g. "POST").
    pub method: &'a str,
    /// Request path (e.g. "/.well-known/challenges/").
    pub path: &'a str,
    /// SHA-256 of the request body, if one is present.
    pub body_hash: Option<[u8; 32]>,
}

impl<'a> RequestContext<'a> {
    /// Build a context, hashing the body if present.
    #[must_use]
    pub fn new(method: &'a str, path: &'a str, body: Option<&[u8]>) -> Self {
        Self {
            method,
            path,
            body_hash: body.map(|b| Sha256::digest(b).into()),
        }
    }
}

/// A parsed `Authorization` header value.
///
/// Fields are public for inspection, but parsing a header proves nothing:
/// validation happens in [`verify_v1`](super::verify_v1), never at
/// construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    /// The principal on whose behalf the request claims to act.
    pub username: String,
    /// Unix timestamp in seconds, generated by the signer.
    pub timestamp: i64,
    /// Random nonce for replay prevention.
    pub nonce: [u8; 16],
    /// Signature over the canonical message.
    pub signature: Signature,
}

impl SignedHeader {
    /// Parse a header value produced by [`sign_request`].
    ///
    /// # Errors
    ///
    /// Returns `AuthnError::Malformed` on any structural defect: wrong
    /// scheme, bad base64, truncation, trailing bytes, non-UTF-8 or blank
    /// username.
    pub fn parse(value: &str) -> Result<Self, AuthnError> {
        let encoded = value.strip_prefix(HEADER_PREFIX).ok_or(AuthnError::Malformed)?;
        let record = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthnError::Malformed)?;

        if record.len() < RECORD_FIXED_LEN {
            return Err(AuthnError::Malformed);
        }

        let timestamp = i64::from_be_bytes(record[0..8].try_into().expect("checked length"));
        let nonce: [u8; 16] = record[8..24].try_into().expect("checked length");
        let username_len = record[24] as usize;

        // The record must end exactly after the username and signature.
        if record.len() != RECORD_FIXED_LEN + username_len {
            return Err(AuthnError::Malformed);
        }

        let username = std::str::from_utf8(&record[25..25 + username_len])
            .map_err(|_| AuthnError::Malformed)?;
        if username.trim().is_empty() {
            return Err(AuthnError::Malformed);
        }

        let signature = Signature::from_bytes(&record[25 + username_len..])
            .map_err(|_| AuthnError::Malformed)?;

        Ok(Self {
            username: username.to_string(),
            timestamp,
            nonce,
            signature,
        })
    }
}

/// Build the canonical message that gets signed.
///
/// Wire format (all multi-byte integers are big-endian):
///
/// | Field          | Size | Description                            |
/// |----------------|------|----------------------------------------|
/// | magic          | 16   | "WELLKNOWN-AUTH\x00\x00"               |
/// | version        | 1    | Protocol version (0x01 for v1)         |
/// | timestamp      | 8    | Unix timestamp in seconds (i64 BE)     |
/// | nonce          | 16   | Random nonce bytes                     |
/// | username_len   | 1    | Length of username (max 255)           |
/// | username       | var  | UTF-8 username                         |
/// | method_len     | 1    | Length of method string (max 255)      |
/// | method         | var  | UTF-8 method string                    |
/// | path_len       | 2    | Length of path string (u16 BE)         |
/// | path           | var  | UTF-8 path string                      |
/// | body_hash_flag | 1    | 0x00=no body, 0x01=body present        |
/// | body_hash      | 32   | SHA-256 of body (if flag==0x01)        |
///
/// # Errors
///
/// Returns `AuthnError::Malformed` if any length limit is exceeded.
pub fn build_canonical_message(
    timestamp: i64,
    nonce: &[u8; 16],
    username: &str,
    ctx: &RequestContext<'_>,
) -> Result<Vec<u8>, AuthnError> {
    let username_bytes = username.as_bytes();
    let method_bytes = ctx.method.as_bytes();
    let path_bytes = ctx.path.as_bytes();

    // Validate lengths before encoding to prevent silent truncation
    if username_bytes.len() > MAX_USERNAME_LEN
        || method_bytes.len() > MAX_METHOD_LEN
        || path_bytes.len() > MAX_PATH_LEN
    {
        return Err(AuthnError::Malformed);
    }

    let mut msg = Vec::with_capacity(128);

    msg.extend_from_slice(AUTH_MAGIC);
    msg.push(AUTH_VERSION_V1);
    msg.extend_from_slice(&timestamp.to_be_bytes());
    msg.extend_from_slice(nonce);

    msg.push(username_bytes.len() as u8);
    msg.extend_from_slice(username_bytes);

    msg.push(method_bytes.len() as u8);
    msg.extend_from_slice(method_bytes);

    msg.extend_from_slice(&(path_bytes.len() as u16).to_be_bytes());
    msg.extend_from_slice(path_bytes);

    match ctx.body_hash {
        Some(hash) => {
            msg.push(0x01);
            msg.extend_from_slice(&hash);
        }
        None => {
            msg.push(0x00);
        }
    }

    Ok(msg)
}

/// Sign a request with explicit freshness material.
///
/// Exposed for tests and for callers that need deterministic output;
/// production code uses [`sign_request_now`].
///
/// # Errors
///
/// Returns `AuthnError::Malformed` if the username is blank or any field
/// exceeds its length limit.
pub fn sign_request(
    username: &str,
    key: &PrivateKey,
    timestamp: i64,
    nonce: [u8; 16],
    ctx: &RequestContext<'_>,
) -> Result<String, AuthnError> {
    if username.trim().is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AuthnError::Malformed);
    }

    let message = build_canonical_message(timestamp, &nonce, username, ctx)?;
    let signature = key.sign(&message);

    let mut record = Vec::with_capacity(RECORD_FIXED_LEN + username.len());
    record.extend_from_slice(&timestamp.to_be_bytes());
    record.extend_from_slice(&nonce);
    record.push(username.len() as u8);
    record.extend_from_slice(username.as_bytes());
    record.extend_from_slice(&signature.to_bytes());

    Ok(format!("{HEADER_PREFIX}{}", URL_SAFE_NO_PAD.encode(record)))
}

/// Sign a request, generating the timestamp and nonce.
///
/// The signer owns the freshness material: current time is read exactly
/// once per call.
///
/// # Errors
///
/// See [`sign_request`].
pub fn sign_request_now(
    username: &str,
    key: &PrivateKey,
    ctx: &RequestContext<'_>,
) -> Result<String, AuthnError> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_secs() as i64;
    let nonce = rand::random::<[u8; 16]>();
    sign_request(username, key, timestamp, nonce, ctx)
}
