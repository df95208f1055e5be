//! Callback validation: the accept/reject decision for a signed challenge.

use subtle::ConstantTimeEq;

use crate::challenge::{challenge_uri, extract_nonce_id};
use crate::identity::Address;
use crate::nonce::{NonceStore, NonceStoreError};

use super::error::ValidationError;
use super::payload::CallbackPayload;
use super::verify::SignatureVerifier;

/// Outcome of one callback attempt, handed to the hosting identity layer.
///
/// Created fresh per attempt and never persisted here; mapping the verified
/// address to a user record is the host's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    address: Option<Address>,
    accepted: bool,
    errors: Vec<ValidationError>,
}

impl AuthenticationResult {
    /// An accepted result can only be produced by [`validate`], which has
    /// verified the signature and consumed the nonce.
    #[must_use]
    pub(crate) fn accepted(address: Address) -> Self {
        Self {
            address: Some(address),
            accepted: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn rejected(address: Option<Address>, error: ValidationError) -> Self {
        Self {
            address,
            accepted: false,
            errors: vec![error],
        }
    }

    /// The verified signer on acceptance; the claimed address (when one
    /// parsed) on rejection.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Whether authentication succeeded.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Rejection reasons, in evaluation order. Empty on acceptance.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

/// Validate a callback submission against the challenge it claims.
///
/// `callback_uri` is the server-side reconstruction of this deployment's
/// callback endpoint; `session_id` is the caller's session, passed
/// explicitly; `body` is the raw untrusted request body.
///
/// Checks run cheapest-first and read-only until the signature has
/// verified; only then is the nonce consumed, so a failed attempt never
/// burns a live challenge and the consume step remains the single source
/// of truth for replay prevention (two racing callbacks get exactly one
/// acceptance).
///
/// # Errors
///
/// `Err` only for storage unavailability, which is a service fault.
/// Every user-attributable failure is an `Ok` result with
/// `accepted == false` and the reason in `errors`.
pub async fn validate<S>(
    callback_uri: &str,
    session_id: &str,
    body: &[u8],
    store: &S,
    verifier: &impl SignatureVerifier,
) -> Result<AuthenticationResult, NonceStoreError>
where
    S: NonceStore + ?Sized,
{
    let payload = match CallbackPayload::parse(body) {
        Ok(payload) => payload,
        Err(error) => return Ok(AuthenticationResult::rejected(None, error)),
    };
    let claimed = Address::parse(&payload.address).ok();

    let nonce_id = match extract_nonce_id(&payload.uri) {
        Ok(id) => id,
        Err(_) => {
            return Ok(AuthenticationResult::rejected(
                claimed,
                ValidationError::InvalidUri,
            ))
        }
    };

    let nonce = match store.find(&nonce_id).await {
        Ok(nonce) => nonce,
        Err(NonceStoreError::Storage(reason)) => return Err(NonceStoreError::Storage(reason)),
        Err(_) => {
            return Ok(AuthenticationResult::rejected(
                claimed,
                ValidationError::UnknownOrExpiredChallenge,
            ))
        }
    };

    if !bool::from(nonce.session_id().as_bytes().ct_eq(session_id.as_bytes())) {
        return Ok(AuthenticationResult::rejected(
            claimed,
            ValidationError::SessionMismatch,
        ));
    }

    // An unconstructable expected URI (non-http callback root) means no
    // claimed URI can match this deployment; same rejection as inequality.
    let expected = match challenge_uri(callback_uri, nonce.id()) {
        Ok(expected) => expected,
        Err(_) => {
            return Ok(AuthenticationResult::rejected(
                claimed,
                ValidationError::UriMismatch,
            ))
        }
    };
    if expected != payload.uri {
        return Ok(AuthenticationResult::rejected(
            claimed,
            ValidationError::UriMismatch,
        ));
    }

    if !verifier.verify(&payload.uri, &payload.signature, &payload.address) {
        return Ok(AuthenticationResult::rejected(
            claimed,
            ValidationError::SignatureVerificationFailed,
        ));
    }
    // The verifier vouched for the claim, so it must parse; a collaborator
    // that accepts unparseable addresses is treated as a failed check
    // before the nonce is spent.
    let Some(address) = claimed else {
        return Ok(AuthenticationResult::rejected(
            None,
            ValidationError::SignatureVerificationFailed,
        ));
    };

    match store.consume(nonce.id()).await {
        Ok(_) => {}
        Err(NonceStoreError::Storage(reason)) => return Err(NonceStoreError::Storage(reason)),
        Err(_) => {
            // Lost the consume race, or the window closed between find and
            // consume; either way the challenge is spent.
            return Ok(AuthenticationResult::rejected(
                Some(address),
                ValidationError::UnknownOrExpiredChallenge,
            ));
        }
    }

    Ok(AuthenticationResult::accepted(address))
}
