//! Cryptographic identity types: signing keys and wallet-style addresses.

mod keys;

pub use keys::{Address, KeyError, PrivateKey, PublicKey, Signature};
