//! Bearer token middleware.

use super::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

const MISSING_HEADER: &str = "No authorization header";
const INVALID_FORMAT: &str = "Invalid authorization header format";
const INVALID_TOKEN: &str = "Invalid token";

/// Rejects requests without `Authorization: Bearer <token>` matching the configured token.
pub(crate) async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Err(e) = verify(request.headers(), &state.config.auth_token) {
        warn!(error = %e, path = %request.uri().path(), "rejected unauthenticated request");
        return Err(e);
    }
    Ok(next.run(request).await)
}

/// Checks the `Authorization` header against `expected`.
///
/// The scheme is matched case-insensitively and the header must hold exactly
/// two whitespace-separated parts.
pub(crate) fn verify(headers: &HeaderMap, expected: &str) -> Result<()> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::unauthorized(MISSING_HEADER))?;
    let value = value.to_str().map_err(|_| Error::unauthorized(INVALID_FORMAT))?;

    let mut parts = value.split_whitespace();
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::unauthorized(INVALID_FORMAT));
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::unauthorized(INVALID_FORMAT));
    }

    if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(Error::unauthorized(INVALID_TOKEN))
    }
}
