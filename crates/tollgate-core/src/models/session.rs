//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a request came from: network address plus client signature
/// (user agent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientOrigin {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }

    /// A material change means both the address and the client signature
    /// changed. A value that was recorded but is no longer presented counts
    /// as changed; a value that was never recorded does not.
    pub fn differs_materially(&self, presented: &ClientOrigin) -> bool {
        fn changed(recorded: &Option<String>, presented: &Option<String>) -> bool {
            match (recorded, presented) {
                (Some(recorded), Some(presented)) => recorded != presented,
                (Some(_), None) => true,
                (None, _) => false,
            }
        }
        changed(&self.ip_address, &presented.ip_address)
            && changed(&self.user_agent, &presented.user_agent)
    }

    /// The origin to record after a successful refresh. Known fields are
    /// never replaced by missing ones.
    pub fn merged_with(&self, presented: &ClientOrigin) -> ClientOrigin {
        ClientOrigin {
            ip_address: presented
                .ip_address
                .clone()
                .or_else(|| self.ip_address.clone()),
            user_agent: presented
                .user_agent
                .clone()
                .or_else(|| self.user_agent.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RevocationReason {
    Logout,
    SignOutEverywhere,
    /// Displaced by a newer login over the concurrent-session limit.
    Evicted,
    /// An already-rotated refresh token was presented again.
    ReplayDetected,
    SuspiciousOrigin,
    AccountDisabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    /// Scopes granted at login; copied into every access token.
    pub scopes: Vec<String>,
    /// SHA-256 of the current refresh token's id. Rotates on refresh.
    pub refresh_token_id: String,
    pub origin: ClientOrigin,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_reason: Option<RevocationReason>,
}

impl Session {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    /// Pre-allocated so the first refresh token can embed it.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub scopes: Vec<String>,
    pub refresh_token_id: String,
    pub origin: ClientOrigin,
    pub expires_at: DateTime<Utc>,
}

/// Compare-and-swap input for refresh-token rotation.
#[derive(Debug, Clone)]
pub struct RotateRefreshToken {
    /// Must equal the session's current `refresh_token_id`.
    pub expected_token_id: String,
    pub new_token_id: String,
    pub origin: ClientOrigin,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}
