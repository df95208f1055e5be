//! Signature verification seam and the bundled Ed25519 implementation.

use base64::prelude::*;

use crate::identity::{Address, PrivateKey, PublicKey, Signature};

/// Domain separation prefix for challenge signatures.
///
/// Prevents cross-protocol reuse: a signature produced for any other
/// purpose over the same bytes will not verify here.
const DOMAIN_PREFIX: &[u8] = b"BITID-CHALLENGE-v1:";

/// Transport blob length: public key (32) || signature (64).
const TRANSPORT_LEN: usize = 96;

/// Verifies that a signature was produced by the claimed address over the
/// exact challenge URI bytes.
///
/// This is the cryptography collaborator seam: implementations own
/// transport decoding and address-format validation. Any failure is a
/// plain `false`; the validator never learns why.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` for concurrent validation.
pub trait SignatureVerifier: Send + Sync {
    /// Check `signature` over `uri` for the claimed `address`.
    fn verify(&self, uri: &str, signature: &str, address: &str) -> bool;
}

/// The message that actually gets signed.
fn signed_message(uri: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_PREFIX.len() + uri.len());
    message.extend_from_slice(DOMAIN_PREFIX);
    message.extend_from_slice(uri.as_bytes());
    message
}

/// Produce the signature transport blob a signing agent sends back.
///
/// Wire format: standard base64 of `public_key (32) || signature (64)`.
/// Carrying the public key lets the service check the address claim
/// without a key directory.
#[must_use]
pub fn sign_challenge(key: &PrivateKey, uri: &str) -> String {
    let signature = key.sign(&signed_message(uri));

    let mut packed = Vec::with_capacity(TRANSPORT_LEN);
    packed.extend_from_slice(&key.public_key().to_bytes());
    packed.extend_from_slice(&signature.to_bytes());
    BASE64_STANDARD.encode(packed)
}

/// Ed25519 [`SignatureVerifier`] over the packed transport format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, uri: &str, signature: &str, address: &str) -> bool {
        let Ok(claimed) = Address::parse(address) else {
            return false;
        };
        let Ok(packed) = BASE64_STANDARD.decode(signature) else {
            return false;
        };
        if packed.len() != TRANSPORT_LEN {
            return false;
        }
        let Ok(public_key) = PublicKey::from_bytes(&packed[..32]) else {
            return false;
        };
        let Ok(signature) = Signature::from_bytes(&packed[32..]) else {
            return false;
        };

        // The claim must be the address of the embedded key, otherwise any
        // valid signature under an unrelated key would authenticate it.
        if Address::from_public_key(&public_key) != claimed {
            return false;
        }

        public_key.verify(&signed_message(uri), &signature)
    }
}
