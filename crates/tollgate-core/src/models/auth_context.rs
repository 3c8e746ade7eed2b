//! Authenticated request context.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthMethod {
    AccessToken,
    ApiKey,
}

/// Identity established for one inbound request, produced by access
/// token validation or API key verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
    /// Present for session-backed callers only.
    pub session_id: Option<Uuid>,
    pub api_key_id: Option<Uuid>,
    pub scopes: BTreeSet<String>,
    pub method: AuthMethod,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
