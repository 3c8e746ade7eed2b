//! Mapping of [`TollgateError`] onto HTTP responses.
//!
//! Error bodies share one shape: `{"error": {"message": ..., "type": ...}}`.
//! Internal details (store messages, upstream errors) are logged, never
//! returned.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tollgate_core::error::TollgateError;
use tollgate_core::money::Money;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetDetail>,
}

#[derive(Debug, Serialize)]
struct BudgetDetail {
    remaining: Money,
    period_resets_at: DateTime<Utc>,
    admin_contact: String,
}

/// Handler error type.
#[derive(Debug)]
pub struct ApiError(pub TollgateError);

impl From<TollgateError> for ApiError {
    fn from(err: TollgateError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn detail(message: impl Into<String>, error_type: &'static str) -> ErrorDetail {
    ErrorDetail {
        message: message.into(),
        error_type,
        locked_until: None,
        budget: None,
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, ErrorDetail) {
        match &self.0 {
            TollgateError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                detail("invalid credentials", "invalid_credentials"),
            ),
            TollgateError::AccountLocked { until } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail {
                    locked_until: *until,
                    ..detail("account is temporarily locked", "account_locked")
                },
            ),
            TollgateError::InvalidToken { .. } => (
                StatusCode::UNAUTHORIZED,
                detail("invalid or expired credential", "invalid_token"),
            ),
            TollgateError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                detail("token has expired", "token_expired"),
            ),
            TollgateError::SessionRevoked => (
                StatusCode::UNAUTHORIZED,
                detail(
                    "session has been revoked; re-authenticate to continue",
                    "session_revoked",
                ),
            ),
            // A missing resource and a denied one look the same.
            TollgateError::Forbidden | TollgateError::NotFound { .. } => {
                (StatusCode::FORBIDDEN, detail("forbidden", "forbidden"))
            }
            TollgateError::BudgetExceeded(denial) => (
                StatusCode::PAYMENT_REQUIRED,
                ErrorDetail {
                    budget: Some(BudgetDetail {
                        remaining: denial.remaining,
                        period_resets_at: denial.period_resets_at,
                        admin_contact: denial.admin_contact.clone(),
                    }),
                    ..detail("tenant budget exceeded", "budget_exceeded")
                },
            ),
            TollgateError::StoreTimeout { .. }
            | TollgateError::ServiceUnavailable(_)
            | TollgateError::Database(_)
            | TollgateError::CacheUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                detail("service temporarily unavailable", "unavailable"),
            ),
            TollgateError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                detail("model service failed", "upstream_error"),
            ),
            TollgateError::Validation { message } => (
                StatusCode::BAD_REQUEST,
                detail(message.clone(), "invalid_request"),
            ),
            TollgateError::AlreadyExists { entity } => (
                StatusCode::CONFLICT,
                detail(format!("{entity} already exists"), "conflict"),
            ),
            TollgateError::Crypto(_) | TollgateError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                detail("internal error", "internal_error"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.parts();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}
