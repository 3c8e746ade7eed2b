//! Tenant isolation and scope enforcement.
//!
//! Every tenant-scoped operation receives a [`TenantScope`] produced here
//! rather than reading a tenant id from the request.

use std::sync::Arc;

use serde_json::json;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::events::{ControlPlaneEvent, EventSink};
use tollgate_core::models::audit::{AuditEventKind, CreateAuditEvent};
use tollgate_core::models::auth_context::AuthContext;
use tollgate_core::models::session::ClientOrigin;
use tracing::warn;
use uuid::Uuid;

/// Proof that a caller was authorized for one tenant and one scope.
///
/// Only [`TenantGuard`] can construct it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: Uuid,
    context: AuthContext,
}

impl TenantScope {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn account_id(&self) -> Uuid {
        self.context.account_id
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }
}

pub struct TenantGuard<E> {
    events: Arc<E>,
}

impl<E> Clone for TenantGuard<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: EventSink> TenantGuard<E> {
    pub fn new(events: Arc<E>) -> Self {
        Self { events }
    }

    /// Allow the operation only if the caller belongs to
    /// `resource_tenant_id` and holds `required_scope`.
    ///
    /// Denials are indistinguishable from a missing resource.
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        required_scope: &str,
        resource_tenant_id: Uuid,
        origin: &ClientOrigin,
    ) -> TollgateResult<TenantScope> {
        if ctx.tenant_id != resource_tenant_id {
            warn!(
                tenant_id = %ctx.tenant_id,
                account_id = %ctx.account_id,
                target_tenant_id = %resource_tenant_id,
                "Cross-tenant access attempt"
            );
            self.audit(
                ctx,
                AuditEventKind::CrossTenantAccess,
                origin,
                json!({ "target_tenant_id": resource_tenant_id, "scope": required_scope }),
            )
            .await;
            return Err(TollgateError::Forbidden);
        }

        if !ctx.has_scope(required_scope) {
            warn!(
                tenant_id = %ctx.tenant_id,
                account_id = %ctx.account_id,
                scope = required_scope,
                "Scope denied"
            );
            self.audit(
                ctx,
                AuditEventKind::ScopeDenied,
                origin,
                json!({ "scope": required_scope }),
            )
            .await;
            return Err(TollgateError::Forbidden);
        }

        Ok(TenantScope {
            tenant_id: resource_tenant_id,
            context: ctx.clone(),
        })
    }

    /// Authorize against the caller's own tenant.
    pub async fn authorize_own(
        &self,
        ctx: &AuthContext,
        required_scope: &str,
        origin: &ClientOrigin,
    ) -> TollgateResult<TenantScope> {
        self.authorize(ctx, required_scope, ctx.tenant_id, origin)
            .await
    }

    async fn audit(
        &self,
        ctx: &AuthContext,
        kind: AuditEventKind,
        origin: &ClientOrigin,
        metadata: serde_json::Value,
    ) {
        let mut event = CreateAuditEvent::new(ctx.tenant_id, kind)
            .actor(ctx.account_id)
            .origin(origin.clone())
            .metadata(metadata);
        if let Some(session_id) = ctx.session_id {
            event = event.session(session_id);
        }
        self.events.emit(ControlPlaneEvent::Security(event)).await;
    }
}
