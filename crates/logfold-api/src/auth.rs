//! HTTP Basic authentication for the server.
//!
//! A single shared credential pair is supplied at process start. The
//! password is kept only as a SHA-256 digest; every request's Basic header
//! is decoded, digested, and compared.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::AppState;

/// The shared credential pair, password stored as a digest.
pub struct Credentials {
    username: String,
    password_digest: [u8; 32],
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password_digest: hash_password(password),
        }
    }

    /// Check a presented pair against the configured one.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && hash_password(password) == self.password_digest
    }
}

/// SHA-256 digest of a password.
pub fn hash_password(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Decode an `Authorization: Basic ...` header value into its credential
/// pair. Returns `None` for anything malformed.
pub fn parse_basic_header(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware rejecting requests without a valid Basic credential pair.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_header);

    let authorized = match presented {
        Some((username, password)) => state.credentials.verify(&username, &password),
        None => false,
    };

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"logfold\"")],
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response();
    }

    next.run(request).await
}
