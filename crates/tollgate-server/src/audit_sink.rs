//! Persists security events to the tenant's audit log.

use std::time::Duration;

use tollgate_core::deadline::with_deadline;
use tollgate_core::events::{ControlPlaneEvent, EventSink, FanOutEventSink, TracingEventSink};
use tollgate_core::repository::AuditLogRepository;
use tracing::warn;

/// Event sink used by the server: every event is logged, security events
/// are also appended to the audit log.
pub type ServerEvents<R> = FanOutEventSink<TracingEventSink, AuditLogSink<R>>;

pub fn server_events<R: AuditLogRepository>(repo: R, timeout: Duration) -> ServerEvents<R> {
    FanOutEventSink::new(TracingEventSink, AuditLogSink::new(repo, timeout))
}

pub struct AuditLogSink<R> {
    repo: R,
    timeout: Duration,
}

impl<R: AuditLogRepository> AuditLogSink<R> {
    pub fn new(repo: R, timeout: Duration) -> Self {
        Self { repo, timeout }
    }
}

impl<R: AuditLogRepository> EventSink for AuditLogSink<R> {
    async fn emit(&self, event: ControlPlaneEvent) {
        let ControlPlaneEvent::Security(audit) = event else {
            return;
        };
        let tenant_id = audit.tenant_id;
        let kind = audit.kind;
        if let Err(e) = with_deadline("audit.append", self.timeout, self.repo.append(audit)).await {
            warn!(%tenant_id, ?kind, error = %e, "Failed to persist audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use tollgate_core::models::audit::{AuditEventKind, CreateAuditEvent};
    use tollgate_core::repository::{AuditEventFilter, Pagination};
    use tollgate_db::MemoryStore;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn only_security_events_are_persisted() {
        let store = MemoryStore::new();
        let sink = AuditLogSink::new(store.clone(), Duration::from_secs(1));
        let tenant_id = Uuid::new_v4();

        sink.emit(ControlPlaneEvent::QuiesceRequested { tenant_id })
            .await;
        sink.emit(ControlPlaneEvent::Security(CreateAuditEvent::new(
            tenant_id,
            AuditEventKind::RefreshReplay,
        )))
        .await;

        let page = AuditLogRepository::list(
            &store,
            tenant_id,
            AuditEventFilter::default(),
            Pagination::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, AuditEventKind::RefreshReplay);
    }
}
