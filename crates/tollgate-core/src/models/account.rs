//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    /// Temporarily locked after repeated failed logins.
    Locked,
    /// Soft-deleted. Accounts are never physically removed.
    Disabled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountKind {
    Human,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub credential_hash: String,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub scopes: Vec<String>,
    pub failed_login_attempts: u32,
    /// Number of lockouts so far, drives exponential backoff.
    pub lockout_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// `true` when the account is locked and the lock has not yet lapsed.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AccountStatus::Locked => self.locked_until.is_none_or(|until| until > now),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub tenant_id: Uuid,
    pub username: String,
    pub email: String,
    /// Already-hashed credential; repositories never see raw secrets.
    pub credential_hash: String,
    pub kind: AccountKind,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateAccount {
    pub email: Option<String>,
    pub credential_hash: Option<String>,
    pub status: Option<AccountStatus>,
    pub scopes: Option<Vec<String>>,
    pub failed_login_attempts: Option<u32>,
    pub lockout_count: Option<u32>,
    /// `Some(Some(t))` = set, `Some(None)` = clear, `None` = no change.
    pub locked_until: Option<Option<DateTime<Utc>>>,
}
