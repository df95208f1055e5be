//! Test harnesses for the login end-to-end tests.
//!
//! Spawns the real HTTP stack on an ephemeral port with a throwaway
//! SQLite database, and provides a wallet stand-in that signs challenges
//! the way a real signing agent would.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpListener;

use bitid_auth::{sign_challenge, Address, PrivateKey};
use bitid_daemon::db::{open_pool, SqliteNonceStore};
use bitid_daemon::http::{self, AppState, HttpConfig};
use bitid_daemon::rate_limit::CallbackRateLimiter;
use bitid_daemon::users::UserStore;

/// Body of a challenge response.
#[derive(Debug, Deserialize)]
pub struct ChallengeResponse {
    pub callback_uri: String,
    pub challenge_uri: String,
    pub expires_in: u64,
}

/// Body of a callback or session response.
#[derive(Debug, Deserialize)]
pub struct OutcomeResponse {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub authenticated: bool,
    pub address: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A running daemon instance with its own database and cookie-aware client.
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with_ttl(Duration::from_secs(600)).await
    }

    pub async fn spawn_with_ttl(ttl: Duration) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = open_pool(dir.path().join("bitid.db"))
            .await
            .expect("Failed to open database");
        let nonces = SqliteNonceStore::new(pool.clone(), ttl)
            .await
            .expect("Failed to create nonce store");
        let users = UserStore::new(pool)
            .await
            .expect("Failed to create user store");

        let state = Arc::new(AppState {
            nonces,
            users,
            sessions: dashmap::DashMap::new(),
            // Generous limits; rate limiting has its own unit tests.
            limiter: CallbackRateLimiter::new(100, 200),
            config: HttpConfig {
                fallback_host: "example.com".to_string(),
                secure: false,
                nonce_ttl: ttl,
            },
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(http::run(Arc::clone(&state), listener));

        Self {
            base: format!("http://{addr}"),
            client: cookie_client(),
            state,
            _dir: dir,
        }
    }

    /// Request a challenge with the server's default client (one session).
    pub async fn challenge(&self) -> ChallengeResponse {
        self.challenge_with(&self.client).await
    }

    /// Request a challenge with a specific client/session.
    pub async fn challenge_with(&self, client: &reqwest::Client) -> ChallengeResponse {
        client
            .get(format!("{}/login/challenge", self.base))
            .send()
            .await
            .expect("Challenge request failed")
            .json()
            .await
            .expect("Challenge response was not JSON")
    }

    pub fn callback_url(&self) -> String {
        format!("{}/login/callback", self.base)
    }

    pub fn session_url(&self) -> String {
        format!("{}/login/session", self.base)
    }
}

/// A fresh client with its own cookie jar (its own session).
pub fn cookie_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to build client")
}

/// Wallet stand-in owning a signing keypair.
pub struct TestWallet {
    pub key: PrivateKey,
}

impl TestWallet {
    pub fn new() -> Self {
        Self {
            key: PrivateKey::generate(),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.key.public_key())
    }

    /// The JSON body a wallet posts back for a challenge.
    pub fn json_payload(&self, uri: &str) -> serde_json::Value {
        serde_json::json!({
            "uri": uri,
            "signature": sign_challenge(&self.key, uri),
            "address": self.address().as_str(),
        })
    }

    /// The same payload as form fields.
    pub fn form_payload(&self, uri: &str) -> Vec<(&'static str, String)> {
        vec![
            ("uri", uri.to_string()),
            ("signature", sign_challenge(&self.key, uri)),
            ("address", self.address().as_str().to_string()),
        ]
    }
}
