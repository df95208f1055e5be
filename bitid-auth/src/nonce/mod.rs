//! Single-use challenge nonces and their storage contract.

mod memory;
mod store;

pub use memory::MemoryNonceStore;
pub use store::{Nonce, NonceStore, NonceStoreError};
