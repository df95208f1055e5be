//! HTTP surface for the challenge/callback exchange.
//!
//! Uses hyper http1 with TokioIo for async handling. Three routes:
//! - `GET  /login/challenge` - issue a challenge bound to the caller's session
//! - `POST /login/callback`  - validate a signed challenge (JSON or form body)
//! - `GET  /login/session`   - report the session's authentication state
//!
//! Sessions are correlated through an opaque `sid` cookie; every core
//! operation receives the session id explicitly.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use uuid::Uuid;

use bitid_auth::{
    build_challenge, callback_uri, validate, Address, Ed25519Verifier, NonceStoreError,
};

use crate::db::SqliteNonceStore;
use crate::rate_limit::CallbackRateLimiter;
use crate::users::UserStore;

/// Route of the challenge endpoint.
pub const CHALLENGE_PATH: &str = "/login/challenge";
/// Route of the callback endpoint the signing agent posts back to.
pub const CALLBACK_PATH: &str = "/login/callback";
/// Route reporting the session's authentication state.
pub const SESSION_PATH: &str = "/login/session";

const SESSION_COOKIE: &str = "sid";

/// Deployment configuration for the HTTP surface.
pub struct HttpConfig {
    /// Host used when a request carries no Host header.
    pub fallback_host: String,
    /// Whether callback URIs are issued as https. Deployment policy, not
    /// a per-request property.
    pub secure: bool,
    /// Challenge validity window, reported to clients as `expires_in`.
    pub nonce_ttl: Duration,
}

/// Shared application state.
pub struct AppState {
    pub nonces: SqliteNonceStore,
    pub users: UserStore,
    /// Sessions that have completed authentication, by session id.
    pub sessions: DashMap<String, Address>,
    pub limiter: CallbackRateLimiter,
    pub config: HttpConfig,
}

/// Accept loop. Runs until the task is dropped.
pub async fn run(state: Arc<AppState>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(peer = %addr, error = %err, "Connection error");
                    }
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "Error accepting connection");
            }
        }
    }
}

/// Route incoming HTTP requests.
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, CHALLENGE_PATH) => handle_challenge(state, req).await,
        (Method::POST, CALLBACK_PATH) => handle_callback(state, req).await,
        (Method::GET, SESSION_PATH) => Ok(handle_session(state, &req)),
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "not found" }),
        )),
    }
}

async fn handle_challenge(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (session_id, fresh_session) = match session_id(&req) {
        Some(sid) => (sid, false),
        None => (Uuid::new_v4().simple().to_string(), true),
    };

    let callback = request_callback_uri(&state, &req);

    match build_challenge(&state.nonces, &session_id, &callback).await {
        Ok((nonce, challenge)) => {
            tracing::debug!(nonce = %nonce.id(), session = %session_id, "Challenge issued");

            let body = serde_json::json!({
                "callback_uri": callback,
                "challenge_uri": challenge,
                "expires_in": state.config.nonce_ttl.as_secs(),
            });
            let mut response = json_response(StatusCode::OK, &body);
            if fresh_session {
                let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly");
                if let Ok(value) = header::HeaderValue::from_str(&cookie) {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
            }
            Ok(response)
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to issue challenge");
            Ok(service_error())
        }
    }
}

async fn handle_callback(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if !state.limiter.check() {
        return Ok(json_response(
            StatusCode::TOO_MANY_REQUESTS,
            &serde_json::json!({ "error": "rate limit exceeded" }),
        ));
    }

    // A caller without a session cookie still gets a full validation run;
    // no issued nonce can be bound to the empty session, so the outcome is
    // a session mismatch, not a special case.
    let session_id = session_id(&req).unwrap_or_default();
    let callback = request_callback_uri(&state, &req);
    let body = req.into_body().collect().await?.to_bytes();

    let result = match validate(
        &callback,
        &session_id,
        &body,
        &state.nonces,
        &Ed25519Verifier,
    )
    .await
    {
        Ok(result) => result,
        Err(NonceStoreError::Storage(reason)) => {
            tracing::error!(error = %reason, "Nonce storage failure during callback");
            return Ok(service_error());
        }
        Err(err) => {
            tracing::error!(error = %err, "Unexpected store failure during callback");
            return Ok(service_error());
        }
    };

    if result.is_accepted() {
        let Some(address) = result.address().cloned() else {
            // validate() guarantees an address on acceptance.
            return Ok(service_error());
        };

        if let Err(err) = state.users.resolve(&address).await {
            tracing::error!(error = %err, "User resolution failed");
            return Ok(service_error());
        }
        state.sessions.insert(session_id.clone(), address.clone());

        tracing::info!(address = %address, session = %session_id, "Authentication accepted");
        Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "accepted": true, "address": address.as_str() }),
        ))
    } else {
        let errors: Vec<String> = result.errors().iter().map(|e| e.to_string()).collect();
        tracing::info!(session = %session_id, errors = ?errors, "Authentication rejected");

        Ok(json_response(
            StatusCode::UNAUTHORIZED,
            &serde_json::json!({
                "accepted": false,
                "address": result.address().map(Address::as_str),
                "errors": errors,
            }),
        ))
    }
}

fn handle_session(state: Arc<AppState>, req: &Request<Incoming>) -> Response<Full<Bytes>> {
    let address = session_id(req)
        .and_then(|sid| state.sessions.get(&sid).map(|entry| entry.value().clone()));

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "authenticated": address.is_some(),
            "address": address.as_ref().map(Address::as_str),
        }),
    )
}

/// Reconstruct this deployment's callback URI for an inbound request.
fn request_callback_uri(state: &AppState, req: &Request<Incoming>) -> String {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(&state.config.fallback_host);
    callback_uri(host, CALLBACK_PATH, state.config.secure)
}

/// Extract the session id from the request's cookies.
fn session_id<B>(req: &Request<B>) -> Option<String> {
    let cookies = req.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

fn service_error() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({ "error": "service unavailable" }),
    )
}
