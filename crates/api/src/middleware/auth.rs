//! Shared-secret check for the scheduler routes.
//!
//! Callers (the product backend, an external cron) send the configured
//! secret in `X-Scheduler-Token`. When no secret is configured the check
//! passes, which is only meant for local development.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use pastime_common::error::AppError;

use crate::state::AppState;

pub const TOKEN_HEADER: &str = "x-scheduler-token";

/// Extractor that rejects requests without the expected scheduler token.
///
/// ```ignore
/// async fn handler(_auth: SchedulerAuth) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SchedulerAuth;

impl FromRequestParts<AppState> for SchedulerAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.token.as_deref() else {
            return Ok(SchedulerAuth);
        };

        let provided = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth(format!("Missing {TOKEN_HEADER} header")))?;

        if token_matches(provided, expected) {
            Ok(SchedulerAuth)
        } else {
            Err(AppError::Auth("Invalid scheduler token".to_string()))
        }
    }
}

/// Constant-time comparison. A length mismatch returns early; the token
/// length is not secret.
fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
