//! JSON bodies and the mapping from [`Error`] to HTTP responses.

use crate::error::Error;
use crate::pipeline::{BudgetOverflow, PackResult};
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

const TOKEN_LIMIT_EXCEEDED: &str = "Token limit exceeded";

/// `{"error": "..."}` body used for every client-side failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Human-readable reason
    pub error: &'a str,
}

/// 500 body carrying full diagnostics.
#[derive(Debug, Serialize)]
pub struct InternalErrorBody<'a> {
    /// Human-readable reason
    pub error: String,
    /// Type tag of the failure
    #[serde(rename = "type")]
    pub kind: &'a str,
    /// Diagnostic trace
    pub traceback: String,
}

/// 400 body for a repository over its token budget.
#[derive(Debug, Serialize)]
pub struct OverflowBody<'a> {
    /// Always `Token limit exceeded`
    pub error: &'static str,
    #[serde(flatten)]
    overflow: &'a BudgetOverflow,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.is_internal() {
            error!(kind = self.kind(), error = %self, "pack request failed");
            let body = InternalErrorBody {
                error: self.to_string(),
                kind: self.kind(),
                traceback: self.trace(),
            };
            return (status, Json(body)).into_response();
        }

        let message = self.to_string();
        let mut response = (status, Json(ErrorBody { error: &message })).into_response();

        if let Self::RateLimited { retry_after_secs, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl IntoResponse for PackResult {
    fn into_response(self) -> Response {
        match self {
            Self::Packed(packed) => (StatusCode::OK, Json(packed)).into_response(),
            Self::Overflow(overflow) => (
                StatusCode::BAD_REQUEST,
                Json(OverflowBody {
                    error: TOKEN_LIMIT_EXCEEDED,
                    overflow: &overflow,
                }),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestionFailure;
    use crate::pipeline::PackedRepository;
    use crate::token::CostEntry;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_body() {
        let response = Error::validation("repo_url is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "repo_url is required"}));
    }

    #[tokio::test]
    async fn test_access_denied_status_is_relayed() {
        let response = Error::access_denied(403, "Repository is not accessible. Make sure it is public").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_internal_error_body() {
        let failure = IngestionFailure::new("clone failed", "GitCommandError", "Traceback...\nGitCommandError: clone failed");
        let response = Error::from(failure).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "clone failed",
                "type": "GitCommandError",
                "traceback": "Traceback...\nGitCommandError: clone failed",
            })
        );
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = Error::RateLimited {
            limit: "5 per 1 second".to_string(),
            retry_after_secs: 1,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[tokio::test]
    async fn test_overflow_body() {
        let response = PackResult::Overflow(BudgetOverflow {
            files_analyzed: 2,
            estimated_tokens: 150_000.0,
            largest_files: vec![
                CostEntry { path: "big.rs".to_string(), tokens: 900 },
                CostEntry { path: "small.rs".to_string(), tokens: 10 },
            ],
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "Token limit exceeded",
                "files_analyzed": 2,
                "estimated_tokens": 150_000.0,
                "largest_files": [
                    {"path": "big.rs", "tokens": 900},
                    {"path": "small.rs", "tokens": 10},
                ],
            })
        );
    }

    #[tokio::test]
    async fn test_packed_body() {
        let response = PackResult::Packed(PackedRepository {
            files_analyzed: 1,
            estimated_tokens: 1_200.0,
            content: "File: a".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"files_analyzed": 1, "estimated_tokens": 1200.0, "content": "File: a"})
        );
    }
}
