//! Unified error handling with Sentry integration.
//!
//! Every route handler returns `Result<T, AppError>`. Each variant maps to a
//! stable machine-readable `kind` and an HTTP status; the response body is
//!
//! ```json
//! {"error": {"kind": "insufficient_balance", "message": "not enough points: have 10, need 50"}}
//! ```
//!
//! Backend failures are captured to Sentry and reported to the caller as
//! `internal` without detail.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use rewards_core::Points;

use crate::db::RepositoryError;
use crate::services::{
    BootstrapError, IdentityError, LedgerError, PurchaseError, QueueEmpty,
};

/// Application-level error type for the ledger service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Credential missing, malformed, expired, forged, or unverifiable.
    #[error("invalid credential")]
    InvalidCredential,

    /// Authenticated but denied by the access policy.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Required request fields absent or malformed.
    #[error("missing fields: {0}")]
    MissingFields(String),

    /// Amount violates the balance policy.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Target account does not exist.
    #[error("user not found")]
    UserNotFound,

    /// Account id already taken.
    #[error("user already exists")]
    AlreadyExists,

    /// Balance does not cover the cost.
    #[error("not enough points: have {available}, need {cost}")]
    InsufficientBalance { available: Points, cost: Points },

    /// Ack with nothing pending.
    #[error("queue empty")]
    QueueEmpty,

    /// Route or feature not available.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::Unauthorized(_) => "unauthorized",
            Self::MissingFields(_) => "missing_fields",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::UserNotFound => "user_not_found",
            Self::AlreadyExists => "already_exists",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::QueueEmpty => "queue_empty",
            Self::NotFound(_) => "not_found",
            Self::Database(_) | Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::MissingFields(_) | Self::InvalidAmount(_) | Self::InsufficientBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::UserNotFound | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::QueueEmpty => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database(_) | Self::Internal(_) => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Request error"
                );
            }
            Self::QueueEmpty => tracing::debug!("ack on empty queue"),
            _ => tracing::debug!(kind = self.kind(), error = %self, "request rejected"),
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredential => Self::InvalidCredential,
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserNotFound => Self::UserNotFound,
            LedgerError::AlreadyExists => Self::AlreadyExists,
            LedgerError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            LedgerError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::MissingFields(fields) => Self::MissingFields(fields),
            PurchaseError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            PurchaseError::Unauthorized => {
                Self::Unauthorized("not permitted to spend from this account".to_string())
            }
            PurchaseError::UserNotFound => Self::UserNotFound,
            PurchaseError::InsufficientBalance { available, cost } => {
                Self::InsufficientBalance { available, cost }
            }
            PurchaseError::Ledger(e) => e.into(),
            PurchaseError::Aborted(msg) => Self::Internal(msg),
        }
    }
}

impl From<QueueEmpty> for AppError {
    fn from(_: QueueEmpty) -> Self {
        Self::QueueEmpty
    }
}

impl From<BootstrapError> for AppError {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::InvalidCredentials => Self::InvalidCredential,
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::InvalidCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::AlreadyExists.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::QueueEmpty.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::InsufficientBalance {
                available: Points::new(10),
                cost: Points::new(50)
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_body_carries_kind_and_message() {
        let (status, body) = body_of(AppError::InsufficientBalance {
            available: Points::new(10),
            cost: Points::new(50),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "insufficient_balance");
        assert_eq!(body["error"]["message"], "not enough points: have 10, need 50");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_of(AppError::Internal("pool exhausted".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "internal");
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_purchase_errors_map_to_kinds() {
        assert_eq!(
            AppError::from(PurchaseError::MissingFields("cost".into())).kind(),
            "missing_fields"
        );
        assert_eq!(AppError::from(PurchaseError::Unauthorized).kind(), "unauthorized");
        assert_eq!(AppError::from(PurchaseError::UserNotFound).kind(), "user_not_found");
        assert_eq!(AppError::from(QueueEmpty).kind(), "queue_empty");
        assert_eq!(
            AppError::from(LedgerError::Repository(RepositoryError::DataCorruption("x".into())))
                .kind(),
            "internal"
        );
    }
}
