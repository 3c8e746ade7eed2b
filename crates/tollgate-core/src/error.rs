//! Error types for the Tollgate control plane.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;

/// Why a spend reservation was refused, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetDenial {
    pub tenant_id: Uuid,
    pub limit: Money,
    pub committed: Money,
    pub reserved: Money,
    pub requested: Money,
    /// What is still available in the current period (never negative).
    pub remaining: Money,
    pub period_resets_at: DateTime<Utc>,
    /// Where tenant administrators can ask for a budget increase.
    pub admin_contact: String,
}

#[derive(Debug, Error)]
pub enum TollgateError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked { until: Option<DateTime<Utc>> },

    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("token has expired")]
    TokenExpired,

    #[error("session has been revoked")]
    SessionRevoked,

    /// Scope or tenant mismatch. Deliberately carries no detail.
    #[error("forbidden")]
    Forbidden,

    #[error("budget exceeded for tenant {}", .0.tenant_id)]
    BudgetExceeded(Box<BudgetDenial>),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("store operation timed out: {operation}")]
    StoreTimeout { operation: &'static str },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("upstream model call failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TollgateError {
    /// Whether a caller may reasonably retry the same request later.
    ///
    /// Authentication, authorization and budget failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreTimeout { .. }
                | Self::ServiceUnavailable(_)
                | Self::Database(_)
                | Self::Upstream(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }
}

pub type TollgateResult<T> = Result<T, TollgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(!TollgateError::InvalidCredentials.is_retryable());
        assert!(!TollgateError::SessionRevoked.is_retryable());
        assert!(!TollgateError::Forbidden.is_retryable());
        let denial = BudgetDenial {
            tenant_id: Uuid::new_v4(),
            limit: Money::from_units(100),
            committed: Money::from_units(95),
            reserved: Money::ZERO,
            requested: Money::from_units(10),
            remaining: Money::from_units(5),
            period_resets_at: Utc::now(),
            admin_contact: "billing@example.com".into(),
        };
        assert!(!TollgateError::BudgetExceeded(Box::new(denial)).is_retryable());
    }

    #[test]
    fn timeouts_are_retryable() {
        let err = TollgateError::StoreTimeout {
            operation: "session.rotate",
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("session.rotate"));
    }
}
