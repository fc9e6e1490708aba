//! HTTP basic auth for the admin surface.

use super::super::state::ServerState;
use crate::config::AdminCredentials;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::warn;

const REALM: &str = "Basic realm=\"Jukebox Admin\", charset=\"UTF-8\"";

/// Decodes `Authorization: Basic <base64(user:pass)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn is_admin_authorized(headers: &HeaderMap, credentials: &AdminCredentials) -> bool {
    match basic_credentials(headers) {
        Some((user, pass)) => {
            let user_ok = constant_time_eq(user.as_bytes(), credentials.user.as_bytes());
            let pass_ok = constant_time_eq(pass.as_bytes(), credentials.pass.as_bytes());
            user_ok & pass_ok
        }
        None => false,
    }
}

pub fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
        "Unauthorized",
    )
        .into_response()
}

pub async fn require_admin(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_admin_authorized(request.headers(), &state.config.admin) {
        warn!("Rejected admin request to {}", request.uri().path());
        return unauthorized_response();
    }
    next.run(request).await
}
