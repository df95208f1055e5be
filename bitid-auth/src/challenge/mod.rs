//! Challenge construction: callback URIs and the signed challenge URIs
//! derived from them.

mod uri;

pub use uri::{
    build_challenge, callback_uri, challenge_uri, extract_nonce_id, ChallengeError,
    ChallengeUriError, CHALLENGE_SCHEME,
};
