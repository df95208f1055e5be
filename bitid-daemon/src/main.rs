//! bitid-daemon - challenge–response wallet authentication service.
//!
//! Serves the challenge/callback HTTP exchange, persists nonces and user
//! identities in SQLite, and ships small `keygen`/`sign` utilities that
//! stand in for a wallet during development and testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use bitid_auth::{sign_challenge, Address, NonceStore, PrivateKey};
use bitid_daemon::db::{open_pool, SqliteNonceStore};
use bitid_daemon::http::{self, AppState, HttpConfig};
use bitid_daemon::rate_limit::CallbackRateLimiter;
use bitid_daemon::users::UserStore;

// ============================================================================
// CLI Definition
// ============================================================================

/// bitid-daemon - wallet authentication service
#[derive(Parser)]
#[command(name = "bitid-daemon", version, about)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BITID_LISTEN", default_value = "127.0.0.1:7341")]
    listen: SocketAddr,

    /// Path to the SQLite database
    #[arg(long, env = "BITID_DB", default_value = "bitid.db")]
    db: PathBuf,

    /// Issue plain-http callback URIs (development deployments)
    #[arg(long, env = "BITID_INSECURE")]
    insecure: bool,

    /// Host used when a request carries no Host header
    #[arg(long, env = "BITID_HOST", default_value = "example.com")]
    fallback_host: String,

    /// Challenge validity window in seconds
    #[arg(long, env = "BITID_NONCE_TTL_SECS", default_value_t = 600)]
    nonce_ttl_secs: u64,

    /// Sustained callback requests per second
    #[arg(long, default_value_t = 5)]
    callback_rate: u32,

    /// Callback request burst size
    #[arg(long, default_value_t = 20)]
    callback_burst: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the authentication service (default if no command given)
    Serve,

    /// Generate a signing keypair for a wallet or test agent
    Keygen,

    /// Produce the callback payload a wallet would post for a challenge
    Sign {
        /// Hex-encoded 32-byte signing key seed
        #[arg(long)]
        key: String,

        /// The challenge URI to sign
        #[arg(long)]
        uri: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(cli.serve).await,
        Commands::Keygen => cmd_keygen(),
        Commands::Sign { key, uri } => cmd_sign(&key, &uri),
    }
}

/// Start the authentication service.
async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ttl = Duration::from_secs(args.nonce_ttl_secs);

    tracing::info!(path = %args.db.display(), "Opening database");
    let pool = open_pool(&args.db).await.context("failed to open database")?;
    let nonces = SqliteNonceStore::new(pool.clone(), ttl)
        .await
        .context("failed to initialize nonce store")?;
    let users = UserStore::new(pool)
        .await
        .context("failed to initialize user store")?;

    let state = Arc::new(AppState {
        nonces: nonces.clone(),
        users,
        sessions: DashMap::new(),
        limiter: CallbackRateLimiter::new(args.callback_rate, args.callback_burst),
        config: HttpConfig {
            fallback_host: args.fallback_host,
            secure: !args.insecure,
            nonce_ttl: ttl,
        },
    });

    // Expired challenges are denied lazily; this just reclaims storage.
    let purge_period = Duration::from_secs(args.nonce_ttl_secs.max(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match nonces.purge_expired().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "Purged expired challenges"),
                Err(err) => tracing::warn!(error = %err, "Challenge purge failed"),
            }
        }
    });

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    tracing::info!(
        listen = %args.listen,
        ttl_secs = args.nonce_ttl_secs,
        "Authentication service listening"
    );
    if args.insecure {
        tracing::warn!("Insecure mode enabled - challenges reference plain-http callbacks");
    }

    tokio::select! {
        _ = http::run(Arc::clone(&state), listener) => {}
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, exiting");
        }
    }

    Ok(())
}

/// Generate and print a wallet keypair.
fn cmd_keygen() -> anyhow::Result<()> {
    let key = PrivateKey::generate();
    let address = Address::from_public_key(&key.public_key());

    println!("address: {address}");
    println!("seed:    {}", hex::encode(key.to_bytes()));
    Ok(())
}

/// Sign a challenge URI and print the callback payload.
fn cmd_sign(key_hex: &str, uri: &str) -> anyhow::Result<()> {
    let seed = hex::decode(key_hex).context("key must be hex")?;
    let key = PrivateKey::from_bytes(&seed).context("key must be a 32-byte seed")?;
    let address = Address::from_public_key(&key.public_key());

    let payload = serde_json::json!({
        "uri": uri,
        "signature": sign_challenge(&key, uri),
        "address": address.as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
