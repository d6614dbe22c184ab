use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use ring::hmac;
use secrecy::ExposeSecret;

use super::state::AppState;
use crate::error::AppError;

/// Middleware that requires `Authorization: Bearer <ADMIN_API_KEY>`
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !api_key_matches(state.config.admin_api_key.expose_secret(), provided) {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Constant-time comparison through HMAC tags
fn api_key_matches(expected: &str, provided: &str) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, expected.as_bytes());
    let tag = hmac::sign(&key, expected.as_bytes());
    hmac::verify(&key, provided.as_bytes(), tag.as_ref()).is_ok()
}
