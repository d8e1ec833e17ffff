//! Per-request signing and verification.

mod error;
mod header;
mod replay_cache;
mod verify;

pub use error::AuthnError;
pub use header::{
    build_canonical_message, sign_request, sign_request_now, RequestContext, SignedHeader,
    MAX_USERNAME_LEN,
};
pub use replay_cache::LruReplayCache;
pub use verify::{verify_v1, ReplayCache, VerifiedRequest, DEFAULT_MAX_SKEW_SECS};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{PrivateKey, PublicKey};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Replay cache backed by a plain mutexed set.
    struct TestReplayCache(Mutex<HashSet<[u8; 16]>>);

    impl TestReplayCache {
        fn new() -> Self {
            Self(Mutex::new(HashSet::new()))
        }
    }

    impl ReplayCache for TestReplayCache {
        fn check_and_insert(&self, _username: &str, nonce: &[u8; 16], _timestamp: i64) -> bool {
            self.0.lock().unwrap().insert(*nonce)
        }
    }

    fn ctx<'a>() -> RequestContext<'a> {
        RequestContext {
            method: "POST",
            path: "/.well-known/challenges/",
            body_hash: Some([0xab; 32]),
        }
    }

    fn signed(username: &str, key: &PrivateKey, timestamp: i64) -> SignedHeader {
        let value = sign_request(username, key, timestamp, rand::random(), &ctx())
            .expect("test inputs are valid");
        SignedHeader::parse(&value).expect("own header parses")
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let now = 1700000000i64;
        let header = signed("deployer", &key, now);

        let verified = verify_v1(&header, &ctx(), now, 300, &keys, &cache).unwrap();
        assert_eq!(verified.username(), "deployer");
    }

    #[test]
    fn test_sign_request_now_roundtrip() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let value = sign_request_now("deployer", &key, &ctx()).unwrap();
        let header = SignedHeader::parse(&value).unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert!(verify_v1(&header, &ctx(), now, 300, &keys, &cache).is_ok());
    }

    #[test]
    fn test_blank_username_rejected_at_signing() {
        let key = PrivateKey::generate();
        assert_eq!(
            sign_request("", &key, 0, [0u8; 16], &ctx()).unwrap_err(),
            AuthnError::Malformed
        );
        assert_eq!(
            sign_request("   ", &key, 0, [0u8; 16], &ctx()).unwrap_err(),
            AuthnError::Malformed
        );
    }

    #[test]
    fn test_tampered_path_rejected() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let now = 1700000000i64;
        let header = signed("deployer", &key, now);

        let tampered = RequestContext {
            path: "/.well-known/challenges/other/",
            ..ctx()
        };
        assert_eq!(
            verify_v1(&header, &tampered, now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );
    }

    #[test]
    fn test_tampered_method_rejected() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let now = 1700000000i64;
        let header = signed("deployer", &key, now);

        let tampered = RequestContext {
            method: "DELETE",
            ..ctx()
        };
        assert_eq!(
            verify_v1(&header, &tampered, now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let now = 1700000000i64;
        let header = signed("deployer", &key, now);

        // Different body hash
        let tampered = RequestContext {
            body_hash: Some([0xcd; 32]),
            ..ctx()
        };
        assert_eq!(
            verify_v1(&header, &tampered, now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );

        // Body stripped entirely
        let stripped = RequestContext {
            body_hash: None,
            ..ctx()
        };
        assert_eq!(
            verify_v1(&header, &stripped, now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );
    }

    #[test]
    fn test_signature_from_other_user_rejected() {
        // A header claiming "deployer" but signed under a different username
        // must not verify: the username is inside the canonical message.
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();

        let now = 1700000000i64;
        let other = signed("intruder", &key, now);
        let forged = SignedHeader {
            username: "deployer".to_string(),
            ..other
        };

        assert_eq!(
            verify_v1(&forged, &ctx(), now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );
    }

    #[test]
    fn test_wrong_key_rejected_but_second_registered_key_accepted() {
        let signing_key = PrivateKey::generate();
        let other_key = PrivateKey::generate();
        let cache = TestReplayCache::new();
        let now = 1700000000i64;

        let header = signed("deployer", &signing_key, now);

        // Only the wrong key registered
        let wrong_only = [other_key.public_key()];
        assert_eq!(
            verify_v1(&header, &ctx(), now, 300, &wrong_only, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );

        // "Try each registered key": signing key listed second still passes
        let both = [other_key.public_key(), signing_key.public_key()];
        assert!(verify_v1(&header, &ctx(), now, 300, &both, &cache).is_ok());
    }

    #[test]
    fn test_no_registered_keys_is_unknown_user() {
        let key = PrivateKey::generate();
        let cache = TestReplayCache::new();
        let now = 1700000000i64;
        let header = signed("deployer", &key, now);

        let none: [PublicKey; 0] = [];
        assert_eq!(
            verify_v1(&header, &ctx(), now, 300, &none, &cache).unwrap_err(),
            AuthnError::UnknownUser
        );
    }

    #[test]
    fn test_freshness_boundaries() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let now = 1700000000i64;
        let skew = 300i64;

        for (timestamp, ok) in [
            (now - skew, true),
            (now + skew, true),
            (now - skew - 1, false),
            (now + skew + 1, false),
            (0, false),
            (i64::MIN, false),
            (i64::MAX, false),
        ] {
            let cache = TestReplayCache::new();
            let header = signed("deployer", &key, timestamp);
            let result = verify_v1(&header, &ctx(), now, skew, &keys, &cache);
            if ok {
                assert!(result.is_ok(), "timestamp {timestamp} should be fresh");
            } else {
                assert_eq!(result.unwrap_err(), AuthnError::Expired, "timestamp {timestamp}");
            }
        }
    }

    #[test]
    fn test_replay_rejected_second_time() {
        let key = PrivateKey::generate();
        let keys = [key.public_key()];
        let cache = TestReplayCache::new();
        let now = 1700000000i64;

        let header = signed("deployer", &key, now);

        assert!(verify_v1(&header, &ctx(), now, 300, &keys, &cache).is_ok());
        assert_eq!(
            verify_v1(&header, &ctx(), now, 300, &keys, &cache).unwrap_err(),
            AuthnError::Replayed
        );
    }

    #[test]
    fn test_invalid_signature_does_not_pollute_replay_cache() {
        // Replay tracking runs after signature verification, so a forged
        // header cannot burn a nonce a legitimate request will later use.
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let cache = TestReplayCache::new();
        let now = 1700000000i64;

        let genuine = signed("deployer", &key, now);
        let forged = SignedHeader {
            signature: other.sign(b"unrelated"),
            ..genuine.clone()
        };

        let keys = [key.public_key()];
        assert_eq!(
            verify_v1(&forged, &ctx(), now, 300, &keys, &cache).unwrap_err(),
            AuthnError::NoMatchingKey
        );
        assert!(verify_v1(&genuine, &ctx(), now, 300, &keys, &cache).is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        for value in [
            "",
            "Bearer abc",
            "Wellknown v1.",
            "Wellknown v1.!!!not-base64!!!",
            "Wellknown v2.AAAA",
            // Valid base64 but far too short for the fixed record
            "Wellknown v1.AAAA",
        ] {
            assert_eq!(
                SignedHeader::parse(value).unwrap_err(),
                AuthnError::Malformed,
                "value {value:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let key = PrivateKey::generate();
        let value = sign_request("deployer", &key, 0, [0u8; 16], &ctx()).unwrap();

        let mut record = URL_SAFE_NO_PAD
            .decode(value.strip_prefix("Wellknown v1.").unwrap())
            .unwrap();
        record.push(0x00);

        let extended = format!("Wellknown v1.{}", URL_SAFE_NO_PAD.encode(record));
        assert_eq!(
            SignedHeader::parse(&extended).unwrap_err(),
            AuthnError::Malformed
        );
    }

    #[test]
    fn test_parse_roundtrip_preserves_fields() {
        let key = PrivateKey::generate();
        let nonce = [0x5au8; 16];
        let value = sign_request("deployer", &key, 1700000000, nonce, &ctx()).unwrap();

        let header = SignedHeader::parse(&value).unwrap();
        assert_eq!(header.username, "deployer");
        assert_eq!(header.timestamp, 1700000000);
        assert_eq!(header.nonce, nonce);
    }

    #[test]
    fn test_canonical_message_format() {
        let timestamp = 0x0102030405060708i64;
        let nonce = [0x11u8; 16];
        let request = RequestContext {
            method: "GET",
            path: "/api/test",
            body_hash: None,
        };

        let msg = build_canonical_message(timestamp, &nonce, "bob", &request).unwrap();

        assert_eq!(&msg[0..14], b"WELLKNOWN-AUTH");
        assert_eq!(&msg[14..16], &[0x00, 0x00]);
        assert_eq!(msg[16], 0x01); // version
        assert_eq!(&msg[17..25], &timestamp.to_be_bytes());
        assert_eq!(&msg[25..41], &nonce);
        assert_eq!(msg[41], 3); // "bob"
        assert_eq!(&msg[42..45], b"bob");
        assert_eq!(msg[45], 3); // "GET"
        assert_eq!(&msg[46..49], b"GET");
        assert_eq!(&msg[49..51], &9u16.to_be_bytes()); // "/api/test"
        assert_eq!(&msg[51..60], b"/api/test");
        assert_eq!(msg[60], 0x00); // no body
        assert_eq!(msg.len(), 61);
    }

    #[test]
    fn test_canonical_message_length_limits() {
        let nonce = [0u8; 16];
        let request = RequestContext {
            method: "GET",
            path: "/",
            body_hash: None,
        };

        let long_user = "u".repeat(256);
        assert_eq!(
            build_canonical_message(0, &nonce, &long_user, &request).unwrap_err(),
            AuthnError::Malformed
        );

        let long_path = "p".repeat(65536);
        let bad = RequestContext {
            method: "GET",
            path: &long_path,
            body_hash: None,
        };
        assert_eq!(
            build_canonical_message(0, &nonce, "bob", &bad).unwrap_err(),
            AuthnError::Malformed
        );
    }
}
