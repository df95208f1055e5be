//! Ed25519 keypairs and the addresses derived from them.
//!
//! - Private keys carry no Debug/Display implementation and are zeroized
//!   on drop by the underlying signing key
//! - Signature verification is strict (weak/small-order keys rejected)
//! - Addresses are base58-encoded SHA-256 digests of the public key and
//!   compare in constant time

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Errors that can occur during key and address operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// The provided bytes have an invalid length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The provided bytes do not represent a valid key.
    #[error("invalid key format")]
    InvalidFormat,

    /// The address string is not a well-formed encoded digest.
    #[error("invalid address format")]
    InvalidAddress,
}

/// A private Ed25519 signing key.
///
/// Held by the signing agent (wallet) side of the exchange; the service
/// only ever sees public keys. No `Debug` implementation, so the key
/// cannot leak through logging.
pub struct PrivateKey(ed25519_dalek::SigningKey);

impl PrivateKey {
    /// Generate a new random private key.
    #[must_use]
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Load a private key from raw seed bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidLength` if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&bytes)))
    }

    /// Sign a message with this private key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }

    /// Derive the public key from this private key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Export the raw seed bytes. Handle with care.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

/// A public Ed25519 verification key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    /// Load a public key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidLength` if the slice is not exactly 32 bytes,
    /// `KeyError::InvalidFormat` if the bytes don't represent a valid point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        let key =
            ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidFormat)?;
        Ok(Self(key))
    }

    /// Export the raw public key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Verify a signature over a message.
    ///
    /// Uses `verify_strict` to reject weak/small-order keys.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify_strict(message, &signature.0).is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", Address::from_public_key(self))
    }
}

/// An Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Load a signature from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidLength` if the slice is not exactly 64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: 64,
            actual: bytes.len(),
        })?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }

    /// Export the raw signature bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_bytes();
        write!(
            f,
            "Signature({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

/// A public identity derived from a key pair.
///
/// Format: base58 encoding of the SHA-256 digest of the public key bytes.
/// The address is what the signing agent claims in a callback and what the
/// hosting identity layer keys user records on.
///
/// Equality comparisons run in constant time; the Hash derive is kept
/// because the hash value is not secret, only equality needs timing
/// protection.
#[derive(Clone, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::derived_hash_with_manual_eq)]
pub struct Address(String);

impl Address {
    /// Derive the address of a public key.
    #[must_use]
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public_key.to_bytes());
        let digest = hasher.finalize();
        Self(bs58::encode(digest).into_string())
    }

    /// Parse an address from its string form.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidAddress` unless the string is base58 for
    /// exactly 32 bytes.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidAddress)?;
        if decoded.len() != 32 {
            return Err(KeyError::InvalidAddress);
        }
        Ok(Self(s.to_string()))
    }

    /// Get the address as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.0)
    }
}
