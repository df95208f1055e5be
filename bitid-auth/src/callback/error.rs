//! Validation error taxonomy.

/// Reasons a callback submission is rejected.
///
/// All variants are recoverable and user-facing: the client may retry with
/// a corrected payload (against the same challenge, if it is still live) or
/// request a new challenge. Storage unavailability is deliberately not
/// represented here; it surfaces as
/// [`NonceStoreError::Storage`](crate::nonce::NonceStoreError::Storage) and
/// is a service fault, not a rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The body parsed as neither a structured nor a form encoding, or a
    /// required field is absent.
    #[error("malformed payload")]
    MalformedPayload,

    /// The claimed challenge URI carries no extractable nonce.
    #[error("invalid uri")]
    InvalidUri,

    /// The nonce is unknown, expired, or already consumed. One message for
    /// all three keeps the endpoint from acting as a challenge oracle.
    #[error("unknown or expired challenge")]
    UnknownOrExpiredChallenge,

    /// The nonce was issued to a different session than the caller's.
    #[error("session mismatch")]
    SessionMismatch,

    /// The claimed URI does not equal the challenge this server issued.
    #[error("uri mismatch")]
    UriMismatch,

    /// The signature does not verify for the claimed address over the URI.
    #[error("signature verification failed")]
    SignatureVerificationFailed,
}
