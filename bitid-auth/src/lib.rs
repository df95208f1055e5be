//! Pure challenge–response authentication for wallet-style identities.
//!
//! A client proves control of a cryptographic [`Address`] by signing a
//! single-use challenge URI issued against its session, without ever
//! transmitting a password. This crate holds the protocol core only:
//! - No network calls
//! - No filesystem or database access
//! - No logging
//! - No ambient clock reads beyond timestamp capture at record creation
//!
//! Collaborators are injected via traits:
//! - [`NonceStore`] - single-use challenge persistence with atomic
//!   consumption ([`MemoryNonceStore`] ships here; hosting services may
//!   bring their own backing store)
//! - [`SignatureVerifier`] - signature/address cryptography
//!   ([`Ed25519Verifier`] ships here)
//!
//! # Example
//!
//! ```ignore
//! use bitid_auth::{build_challenge, validate, Ed25519Verifier, MemoryNonceStore};
//!
//! let store = MemoryNonceStore::new(std::time::Duration::from_secs(600), 10_000);
//! let (nonce, uri) = build_challenge(&store, session_id, &callback).await?;
//!
//! // ... the wallet signs `uri` and posts it back ...
//!
//! let result = validate(&callback, session_id, body, &store, &Ed25519Verifier).await?;
//! ```

pub mod callback;
pub mod challenge;
pub mod identity;
pub mod nonce;

pub use callback::{
    sign_challenge, validate, AuthenticationResult, CallbackPayload, Ed25519Verifier,
    SignatureVerifier, ValidationError,
};
pub use challenge::{
    build_challenge, callback_uri, challenge_uri, extract_nonce_id, ChallengeError,
    ChallengeUriError,
};
pub use identity::{Address, KeyError, PrivateKey, PublicKey, Signature};
pub use nonce::{MemoryNonceStore, Nonce, NonceStore, NonceStoreError};
