//! Axum extractor for the caller's asset store token.

use crate::error::SimStageError;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Request header carrying the asset store token
pub static HEADER_GIRDER_TOKEN: &str = "girdertoken";

/// The caller's asset store token, taken from the `girderToken` header.
///
/// Rejects requests whose header is missing, empty or not visible ASCII.
#[derive(Clone)]
pub struct GirderToken(pub String);

impl std::fmt::Debug for GirderToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GirderToken(***)")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for GirderToken
where
    S: Send + Sync,
{
    type Rejection = SimStageError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(HEADER_GIRDER_TOKEN)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| GirderToken(token.to_string()))
            .ok_or_else(|| SimStageError::BadRequest {
                reason: "Invalid token or parameter ID.".to_string(),
            })
    }
}
