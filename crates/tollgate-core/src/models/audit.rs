//! Security audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::session::ClientOrigin;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventKind {
    LoginFailed,
    AccountLocked,
    /// An already-rotated refresh token was presented.
    RefreshReplay,
    /// A refresh arrived from a materially different origin.
    SuspiciousOrigin,
    SessionEvicted,
    CrossTenantAccess,
    ScopeDenied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub kind: AuditEventKind,
    pub origin: ClientOrigin,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditEvent {
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub kind: AuditEventKind,
    pub origin: ClientOrigin,
    pub metadata: serde_json::Value,
}

impl CreateAuditEvent {
    pub fn new(tenant_id: Uuid, kind: AuditEventKind) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            session_id: None,
            kind,
            origin: ClientOrigin::default(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn origin(mut self, origin: ClientOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
