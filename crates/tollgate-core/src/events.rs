//! Structured events for the administrative/notification channel.
//!
//! The control plane only emits events; formatting and delivery to
//! tenant administrators happen elsewhere.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::audit::CreateAuditEvent;
use crate::models::budget::BudgetAlert;
use crate::money::Money;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPlaneEvent {
    /// A spend threshold was crossed.
    BudgetAlert(BudgetAlert),
    TenantSuspended {
        tenant_id: Uuid,
        exposure: Money,
        limit: Money,
    },
    /// In-flight compute for a suspended tenant should wind down.
    QuiesceRequested { tenant_id: Uuid },
    TenantReactivated { tenant_id: Uuid },
    /// Security-relevant activity (replay, suspicious origin, ...).
    Security(CreateAuditEvent),
}

impl ControlPlaneEvent {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::BudgetAlert(alert) => alert.tenant_id,
            Self::TenantSuspended { tenant_id, .. }
            | Self::QuiesceRequested { tenant_id }
            | Self::TenantReactivated { tenant_id } => *tenant_id,
            Self::Security(event) => event.tenant_id,
        }
    }
}

/// Receiver of control-plane events. Emission is best-effort and never
/// fails the operation that produced the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ControlPlaneEvent) -> impl Future<Output = ()> + Send;
}

impl<E: EventSink> EventSink for Arc<E> {
    async fn emit(&self, event: ControlPlaneEvent) {
        self.as_ref().emit(event).await
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    async fn emit(&self, event: ControlPlaneEvent) {
        let tenant_id = event.tenant_id();
        match &event {
            ControlPlaneEvent::Security(audit) => warn!(
                %tenant_id,
                kind = ?audit.kind,
                actor_id = ?audit.actor_id,
                session_id = ?audit.session_id,
                "Security event"
            ),
            ControlPlaneEvent::BudgetAlert(alert) => warn!(
                %tenant_id,
                threshold_pct = alert.threshold_pct,
                spend = %alert.spend_at_alert,
                limit = %alert.limit,
                "Budget threshold crossed"
            ),
            other => info!(%tenant_id, event = ?other, "Control-plane event"),
        }
    }
}

/// Delivers every event to two sinks in turn. Nest to fan out further.
#[derive(Debug, Clone, Default)]
pub struct FanOutEventSink<A, B> {
    first: A,
    second: B,
}

impl<A: EventSink, B: EventSink> FanOutEventSink<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: EventSink, B: EventSink> EventSink for FanOutEventSink<A, B> {
    async fn emit(&self, event: ControlPlaneEvent) {
        self.first.emit(event.clone()).await;
        self.second.emit(event).await;
    }
}

/// Forwards events over an unbounded tokio channel to a delivery task.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ControlPlaneEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlPlaneEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    async fn emit(&self, event: ControlPlaneEvent) {
        if self.tx.send(event).is_err() {
            warn!("Event receiver dropped; control-plane event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::AuditEventKind;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        let tenant_id = Uuid::new_v4();
        sink.emit(ControlPlaneEvent::QuiesceRequested { tenant_id })
            .await;
        sink.emit(ControlPlaneEvent::Security(CreateAuditEvent::new(
            tenant_id,
            AuditEventKind::RefreshReplay,
        )))
        .await;

        assert!(matches!(
            rx.recv().await,
            Some(ControlPlaneEvent::QuiesceRequested { .. })
        ));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.tenant_id(), tenant_id);
    }

    #[tokio::test]
    async fn fan_out_reaches_both_sinks() {
        let (a, mut rx_a) = ChannelEventSink::new();
        let (b, mut rx_b) = ChannelEventSink::new();
        let sink = FanOutEventSink::new(a, b);
        let tenant_id = Uuid::new_v4();
        sink.emit(ControlPlaneEvent::TenantReactivated { tenant_id })
            .await;
        assert_eq!(rx_a.recv().await.unwrap().tenant_id(), tenant_id);
        assert_eq!(rx_b.recv().await.unwrap().tenant_id(), tenant_id);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(ControlPlaneEvent::TenantReactivated {
            tenant_id: Uuid::new_v4(),
        })
        .await;
    }
}
