//! Callback handling: payload parsing, signature verification, and the
//! accept/reject decision.

mod error;
mod payload;
mod validate;
mod verify;

pub use error::ValidationError;
pub use payload::CallbackPayload;
pub use validate::{validate, AuthenticationResult};
pub use verify::{sign_challenge, Ed25519Verifier, SignatureVerifier};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::build_challenge;
    use crate::identity::{Address, PrivateKey};
    use crate::nonce::{MemoryNonceStore, NonceStore, NonceStoreError};
    use async_trait::async_trait;
    use std::time::Duration;

    const CALLBACK: &str = "https://example.com/login/callback";
    const SESSION: &str = "sess-1";

    fn store() -> MemoryNonceStore {
        MemoryNonceStore::new(Duration::from_secs(60), 1000)
    }

    fn json_body(uri: &str, signature: &str, address: &Address) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "uri": uri,
            "signature": signature,
            "address": address.as_str(),
        }))
        .unwrap()
    }

    fn signed_body(key: &PrivateKey, uri: &str) -> Vec<u8> {
        json_body(
            uri,
            &sign_challenge(key, uri),
            &Address::from_public_key(&key.public_key()),
        )
    }

    #[tokio::test]
    async fn test_round_trip_accepts_exactly_once() {
        let store = store();
        let key = PrivateKey::generate();
        let address = Address::from_public_key(&key.public_key());

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        let body = signed_body(&key, &uri);

        let first = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert!(first.is_accepted());
        assert_eq!(first.address(), Some(&address));
        assert!(first.errors().is_empty());

        // An identical resubmission finds the nonce spent.
        let second = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert!(!second.is_accepted());
        assert_eq!(
            second.errors(),
            &[ValidationError::UnknownOrExpiredChallenge]
        );
    }

    #[tokio::test]
    async fn test_form_encoding_accepted() {
        let store = store();
        let key = PrivateKey::generate();

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        let body = serde_urlencoded::to_string([
            ("uri", uri.as_str()),
            ("signature", &sign_challenge(&key, &uri)),
            (
                "address",
                Address::from_public_key(&key.public_key()).as_str(),
            ),
        ])
        .unwrap();

        let result = validate(CALLBACK, SESSION, body.as_bytes(), &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert!(result.is_accepted());
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let store = store();
        let result = validate(CALLBACK, SESSION, b"not a payload", &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert!(!result.is_accepted());
        assert_eq!(result.errors(), &[ValidationError::MalformedPayload]);
        assert!(result.address().is_none());
    }

    #[tokio::test]
    async fn test_unextractable_uri_rejected() {
        let store = store();
        let key = PrivateKey::generate();
        let uri = "https://example.com/login/callback?x=abc";
        let body = signed_body(&key, uri);

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(result.errors(), &[ValidationError::InvalidUri]);
    }

    #[tokio::test]
    async fn test_unknown_nonce_rejected() {
        let store = store();
        let key = PrivateKey::generate();
        let uri = "bitid://example.com/login/callback?x=deadbeefdeadbeefdeadbeefdeadbeef";
        let body = signed_body(&key, uri);

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(
            result.errors(),
            &[ValidationError::UnknownOrExpiredChallenge]
        );
    }

    #[tokio::test]
    async fn test_expired_nonce_rejected_like_unknown() {
        let store = MemoryNonceStore::new(Duration::from_millis(10), 1000);
        let key = PrivateKey::generate();

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        let body = signed_body(&key, &uri);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(
            result.errors(),
            &[ValidationError::UnknownOrExpiredChallenge]
        );
    }

    #[tokio::test]
    async fn test_session_mismatch_rejected() {
        let store = store();
        let key = PrivateKey::generate();

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        let body = signed_body(&key, &uri);

        // A captured challenge replayed into a different session fails even
        // though the signature is perfectly valid.
        let result = validate(CALLBACK, "sess-2", &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(result.errors(), &[ValidationError::SessionMismatch]);
    }

    #[tokio::test]
    async fn test_uri_mismatch_rejected_despite_valid_signature() {
        let store = store();
        let key = PrivateKey::generate();

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        // Signed consistently, but over a URI this server never issued.
        let doctored = format!("{uri}&note=1");
        let body = signed_body(&key, &doctored);

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(result.errors(), &[ValidationError::UriMismatch]);
    }

    #[tokio::test]
    async fn test_tampered_signature_leaves_challenge_live() {
        let store = store();
        let key = PrivateKey::generate();
        let address = Address::from_public_key(&key.public_key());

        let (nonce, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();

        let mut signature = sign_challenge(&key, &uri);
        // Corrupt the tail of the base64 blob.
        signature.replace_range(signature.len() - 4.., "AAAA");
        let body = json_body(&uri, &signature, &address);

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(
            result.errors(),
            &[ValidationError::SignatureVerificationFailed]
        );
        assert!(!store.find(nonce.id()).await.unwrap().is_consumed());

        // A corrected resubmission against the same challenge succeeds.
        let corrected = signed_body(&key, &uri);
        let retry = validate(CALLBACK, SESSION, &corrected, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert!(retry.is_accepted());
    }

    #[tokio::test]
    async fn test_signature_by_wrong_key_rejected() {
        let store = store();
        let signer = PrivateKey::generate();
        let claimed = Address::from_public_key(&PrivateKey::generate().public_key());

        let (_, uri) = build_challenge(&store, SESSION, CALLBACK).await.unwrap();
        let body = json_body(&uri, &sign_challenge(&signer, &uri), &claimed);

        let result = validate(CALLBACK, SESSION, &body, &store, &Ed25519Verifier)
            .await
            .unwrap();
        assert_eq!(
            result.errors(),
            &[ValidationError::SignatureVerificationFailed]
        );
    }

    /// Store stub whose every operation reports unavailability.
    struct DownStore;

    #[async_trait]
    impl NonceStore for DownStore {
        async fn create(&self, _session_id: &str) -> Result<crate::nonce::Nonce, NonceStoreError> {
            Err(NonceStoreError::Storage("down".into()))
        }

        async fn find(&self, _id: &str) -> Result<crate::nonce::Nonce, NonceStoreError> {
            Err(NonceStoreError::Storage("down".into()))
        }

        async fn consume(&self, _id: &str) -> Result<crate::nonce::Nonce, NonceStoreError> {
            Err(NonceStoreError::Storage("down".into()))
        }

        async fn purge_expired(&self) -> Result<usize, NonceStoreError> {
            Err(NonceStoreError::Storage("down".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal_not_a_rejection() {
        let key = PrivateKey::generate();
        let uri = "bitid://example.com/login/callback?x=abc";
        let body = signed_body(&key, uri);

        let result = validate(CALLBACK, SESSION, &body, &DownStore, &Ed25519Verifier).await;
        assert!(matches!(result, Err(NonceStoreError::Storage(_))));
    }
}
