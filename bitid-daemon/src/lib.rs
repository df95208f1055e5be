//! Hosting service for challenge–response wallet authentication.
//!
//! Wires the protocol core from `bitid-auth` to a concrete deployment:
//! SQLite-backed nonce and user storage, an HTTP surface for the
//! challenge/callback exchange, cookie-based session correlation, and
//! rate limiting on the callback endpoint.

pub mod db;
pub mod http;
pub mod rate_limit;
pub mod users;

pub use http::{run, AppState, HttpConfig};
