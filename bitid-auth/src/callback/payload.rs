//! Untrusted callback payload parsing.
//!
//! Signing agents post the signed challenge back in one of two equally
//! valid transport encodings: a JSON document or a classic form body.
//! A body that fails JSON decoding silently falls back to form decoding;
//! only when both fail (or a field is absent from whichever decoded) is
//! the payload rejected.

use serde::Deserialize;

use super::error::ValidationError;

/// Field-by-field view before presence is checked, so "did not decode"
/// and "decoded but incomplete" stay distinguishable.
#[derive(Debug, Deserialize)]
struct RawPayload {
    uri: Option<String>,
    signature: Option<String>,
    address: Option<String>,
}

/// A complete callback submission.
///
/// Fields are public because this is a transfer object; nothing about it is
/// trusted until [`validate`](super::validate) has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    /// The challenge URI the client claims to have signed.
    pub uri: String,
    /// Transport-encoded signature over the URI.
    pub signature: String,
    /// The address the signer claims.
    pub address: String,
}

impl CallbackPayload {
    /// Parse a request body in either transport encoding.
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let raw: RawPayload = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(_) => serde_urlencoded::from_bytes(body)
                .map_err(|_| ValidationError::MalformedPayload)?,
        };

        match (raw.uri, raw.signature, raw.address) {
            (Some(uri), Some(signature), Some(address)) => Ok(Self {
                uri,
                signature,
                address,
            }),
            _ => Err(ValidationError::MalformedPayload),
        }
    }
}
