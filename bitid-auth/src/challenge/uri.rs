//! Deterministic URI construction for the challenge exchange.
//!
//! The challenge URI is the callback URI with its scheme rewritten to
//! [`CHALLENGE_SCHEME`] plus the nonce id in the `x` query parameter:
//!
//! ```text
//! callback:  https://example.com/login/callback
//! challenge: bitid://example.com/login/callback?x=fe32e61882a71074...
//! ```
//!
//! A plain-http callback is marked with a trailing `u=1` parameter so the
//! signing agent knows it is answering an insecure deployment.

use serde::Deserialize;

use crate::nonce::{Nonce, NonceStore, NonceStoreError};

/// URI scheme of the challenge the signing agent signs.
pub const CHALLENGE_SCHEME: &str = "bitid";

/// Errors from challenge URI construction and parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ChallengeUriError {
    /// The callback URI is not http or https.
    #[error("callback uri must be http or https")]
    UnsupportedCallbackScheme,

    /// The claimed challenge URI does not carry the expected scheme.
    #[error("challenge uri has wrong scheme")]
    WrongScheme,

    /// The claimed challenge URI carries no nonce parameter.
    #[error("challenge uri carries no nonce")]
    MissingNonce,

    /// The claimed challenge URI query string does not parse.
    #[error("challenge uri query is malformed")]
    MalformedQuery,
}

/// Errors from building a complete challenge.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error(transparent)]
    Store(#[from] NonceStoreError),

    #[error(transparent)]
    Uri(#[from] ChallengeUriError),
}

/// Build the absolute callback endpoint URI for an inbound request.
///
/// `secure` is a deployment-policy flag (development deployments run plain
/// http), not a property of the individual request.
#[must_use]
pub fn callback_uri(host: &str, path: &str, secure: bool) -> String {
    format!("http{}://{}{}", if secure { "s" } else { "" }, host, path)
}

/// Encode a callback URI and nonce id into the challenge URI.
///
/// Nonce ids are generated as lowercase hex, so they need no
/// percent-encoding.
pub fn challenge_uri(callback_uri: &str, nonce_id: &str) -> Result<String, ChallengeUriError> {
    let (rest, secure) = if let Some(rest) = callback_uri.strip_prefix("https://") {
        (rest, true)
    } else if let Some(rest) = callback_uri.strip_prefix("http://") {
        (rest, false)
    } else {
        return Err(ChallengeUriError::UnsupportedCallbackScheme);
    };

    let mut uri = format!("{CHALLENGE_SCHEME}://{rest}?x={nonce_id}");
    if !secure {
        uri.push_str("&u=1");
    }
    Ok(uri)
}

#[derive(Deserialize)]
struct ChallengeQuery {
    x: Option<String>,
}

/// Extract the nonce id embedded in a claimed challenge URI.
pub fn extract_nonce_id(uri: &str) -> Result<String, ChallengeUriError> {
    let rest = uri
        .strip_prefix(CHALLENGE_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
        .ok_or(ChallengeUriError::WrongScheme)?;

    let query = rest
        .split_once('?')
        .map(|(_, query)| query)
        .ok_or(ChallengeUriError::MissingNonce)?;

    let params: ChallengeQuery =
        serde_urlencoded::from_str(query).map_err(|_| ChallengeUriError::MalformedQuery)?;

    match params.x {
        Some(x) if !x.is_empty() => Ok(x),
        _ => Err(ChallengeUriError::MissingNonce),
    }
}

/// Issue a fresh nonce for `session_id` and encode it into a challenge URI.
///
/// The nonce creation is the only side effect.
pub async fn build_challenge<S>(
    store: &S,
    session_id: &str,
    callback_uri: &str,
) -> Result<(Nonce, String), ChallengeError>
where
    S: NonceStore + ?Sized,
{
    let nonce = store.create(session_id).await?;
    let uri = challenge_uri(callback_uri, nonce.id())?;
    Ok((nonce, uri))
}
