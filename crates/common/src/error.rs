use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Common infrastructure error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

/// Failure taxonomy surfaced in dispatch results and queue rejections.
/// Serialized with the same PascalCase names it displays as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The permission oracle rejected the user/category; nothing is queued.
    PermissionDenied,
    /// The daily cap was reached; terminal, never retried.
    RateLimited,
    /// Network trouble or timeout; retried with backoff.
    TransportTransient,
    /// Invalid recipient or hard bounce; failed immediately.
    TransportPermanent,
    /// Unclassified; retried like a transient error.
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::PermissionDenied => write!(f, "PermissionDenied"),
            FailureKind::RateLimited => write!(f, "RateLimited"),
            FailureKind::TransportTransient => write!(f, "TransportTransient"),
            FailureKind::TransportPermanent => write!(f, "TransportPermanent"),
            FailureKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Classified failure reported by a mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    #[error("unclassified delivery failure: {0}")]
    Unknown(String),
}

impl DeliveryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DeliveryError::Transient(_) => FailureKind::TransportTransient,
            DeliveryError::Permanent(_) => FailureKind::TransportPermanent,
            DeliveryError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Unknown failures are treated conservatively as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Permanent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_classification() {
        assert!(DeliveryError::Transient("timeout".into()).is_retryable());
        assert!(DeliveryError::Unknown("??".into()).is_retryable());
        assert!(!DeliveryError::Permanent("bounced".into()).is_retryable());
        assert_eq!(
            DeliveryError::Permanent("bounced".into()).kind(),
            FailureKind::TransportPermanent
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::RateLimited.to_string(), "RateLimited");
        assert_eq!(FailureKind::PermissionDenied.to_string(), "PermissionDenied");
        assert_eq!(
            serde_json::to_value(FailureKind::RateLimited).unwrap(),
            "RateLimited"
        );
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let response = AppError::Validation("bad payload".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::Auth("missing token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
