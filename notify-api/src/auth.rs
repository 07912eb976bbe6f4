use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use notify_core::UserId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;

use crate::server::ApiState;

/// JWT claims issued by the user service.
///
/// The user service signs `{ id, role }` only; `exp` is checked when present.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
}

/// Authenticated user information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: String,
}

/// Extract JWT token from Authorization header
fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    extract_token(headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()))
}

/// Issue a token the way the user service does. Used by tooling and tests.
pub fn generate_token(
    user_id: UserId,
    role: &str,
    secret: &str,
    expires_in_secs: u64,
) -> Result<String, StatusCode> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_secs();

    let claims = Claims {
        id: user_id,
        role: role.to_string(),
        exp: Some((now + expires_in_secs) as usize),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Verify JWT signature (and expiry, if the token has one), and extract the user id claim
pub fn verify_token(token: &str, secret: &str) -> Result<AuthenticatedUser, StatusCode> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let mut validation = Validation::default();
    validation.required_spec_claims.clear();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(AuthenticatedUser {
            user_id: token_data.claims.id,
            role: token_data.claims.role,
        }),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Authenticates a live connection before it is upgraded.
///
/// The token travels as connection metadata: the `token` query parameter, or
/// an `Authorization: Bearer` header for clients that can set one.
pub fn authenticate_handshake(
    query_token: Option<&str>,
    headers: &HeaderMap,
    secret: &str,
) -> Result<AuthenticatedUser, StatusCode> {
    let token = query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| bearer_from_headers(headers))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    verify_token(&token, secret)
}

/// Health checks are public; the websocket route authenticates its own handshake.
fn is_public_path(path: &str) -> bool {
    path == "/health" || path == "/ws"
}

/// Axum middleware for JWT authentication
pub async fn auth_middleware(
    mut req: Request,
    next: axum::middleware::Next,
) -> Result<Response, StatusCode> {
    if is_public_path(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = match bearer_from_headers(req.headers()) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let state = req
        .extensions()
        .get::<ApiState>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let user = verify_token(&token, &state.ctx.config.server.jwt_secret)?;
    tracing::debug!("Authenticated user: {}", user.user_id);

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
