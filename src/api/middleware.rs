use crate::api::AppState;
use crate::error::{AppError, Result};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use std::sync::Arc;

/// Rejects requests that do not carry the configured bearer token.
pub struct RequireToken;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if !tokens_match(token.trim().as_bytes(), state.bridge_token.as_bytes()) {
            tracing::warn!("Rejected request to {} with a wrong token", parts.uri.path());
            return Err(AppError::Unauthorized);
        }

        Ok(RequireToken)
    }
}

// Compares every byte so timing does not leak the matching prefix length.
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"abcdefghijklmnop", b"abcdefghijklmnop"));
        assert!(!tokens_match(b"abcdefghijklmnoq", b"abcdefghijklmnop"));
        assert!(!tokens_match(b"abc", b"abcdefghijklmnop"));
    }
}
