//! Authentication error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tollgate_core::error::TollgateError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked { until: Option<DateTime<Utc>> },

    #[error("account is disabled")]
    AccountDisabled,

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for TollgateError {
    fn from(err: AuthError) -> Self {
        match err {
            // Disabled accounts are indistinguishable from bad credentials
            // to the caller.
            AuthError::InvalidCredentials | AuthError::AccountDisabled => {
                TollgateError::InvalidCredentials
            }
            AuthError::AccountLocked { until } => TollgateError::AccountLocked { until },
            AuthError::WeakPassword { .. } => TollgateError::Validation {
                message: err.to_string(),
            },
            AuthError::TokenExpired => TollgateError::TokenExpired,
            AuthError::TokenInvalid(reason) => TollgateError::InvalidToken { reason },
            AuthError::Crypto(msg) => TollgateError::Crypto(msg),
        }
    }
}
