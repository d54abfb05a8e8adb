// src/utils/admin_key.rs

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::{
    config::{ADMIN_KEY_HEADER, Config},
    error::AppError,
};

/// Axum Middleware: Admin Authorization.
///
/// Compares the `x-admin-key` header with the configured secret.
/// Missing or wrong keys get 401 Unauthorized.
pub async fn admin_key_middleware(
    State(config): State<Config>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Missing admin key".to_string()))?;

    if !keys_match(supplied.as_bytes(), config.admin_key.as_bytes()) {
        tracing::warn!("Rejected admin request to {}", req.uri().path());
        return Err(AppError::AuthError("Invalid admin key".to_string()));
    }

    Ok(next.run(req).await)
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn keys_match(supplied: &[u8], expected: &[u8]) -> bool {
    if supplied.len() != expected.len() {
        return false;
    }

    supplied
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
