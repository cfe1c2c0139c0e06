pub mod bookings;
pub mod catalog;
pub mod chat;
pub mod health;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Admin routes require `Authorization: Bearer <ADMIN_TOKEN>`.
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
