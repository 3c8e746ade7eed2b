//! The budget governor: reserve, commit and release spend per tenant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tollgate_core::deadline::with_deadline;
use tollgate_core::error::{BudgetDenial, TollgateError, TollgateResult};
use tollgate_core::events::{ControlPlaneEvent, EventSink};
use tollgate_core::models::budget::{
    BudgetAlert, BudgetState, CommitReservation, CreateBudgetAlert, CreateSpendRecord, Reservation,
    SpendRecord,
};
use tollgate_core::models::tenant::TenantStatus;
use tollgate_core::money::Money;
use tollgate_core::period::{next_period_start, period_start_of};
use tollgate_core::repository::{BudgetLedgerRepository, PaginatedResult, Pagination};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BudgetConfig;
use crate::thresholds::{self, Evaluation, HARD_LIMIT_PCT};

/// Point-in-time view of a tenant's budget.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    pub tenant_id: Uuid,
    pub limit: Money,
    pub committed: Money,
    pub reserved: Money,
    pub remaining: Money,
    pub utilization_pct: f64,
    pub status: TenantStatus,
    pub alert_level: u8,
    pub period_start: DateTime<Utc>,
    pub period_resets_at: DateTime<Utc>,
}

impl From<&BudgetState> for BudgetSnapshot {
    fn from(state: &BudgetState) -> Self {
        Self {
            tenant_id: state.tenant_id,
            limit: state.limit,
            committed: state.committed,
            reserved: state.reserved,
            remaining: state.remaining(),
            utilization_pct: state.utilization_pct(),
            status: state.status,
            alert_level: state.alert_level,
            period_start: state.period_start,
            period_resets_at: next_period_start(state.period_start),
        }
    }
}

/// Serializes budget mutations per tenant. Tenants never contend with
/// each other; the store's conditional increment guards against other
/// processes.
pub struct BudgetGovernor<L, E> {
    ledger: L,
    events: Arc<E>,
    config: BudgetConfig,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<L: BudgetLedgerRepository, E: EventSink> BudgetGovernor<L, E> {
    pub fn new(ledger: L, events: Arc<E>, config: BudgetConfig) -> Self {
        Self {
            ledger,
            events,
            config,
            locks: DashMap::new(),
        }
    }

    fn tenant_lock(&self, tenant_id: Uuid) -> Arc<Mutex<()>> {
        // Clone out of the map so the shard guard is not held across an
        // await.
        self.locks
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn current_state(&self, tenant_id: Uuid) -> TollgateResult<BudgetState> {
        let timeout = self.config.store_timeout();
        let state = with_deadline(
            "budget.get_state",
            timeout,
            self.ledger.get_state(tenant_id),
        )
        .await?;

        let period = period_start_of(Utc::now());
        if period <= state.period_start {
            return Ok(state);
        }
        let rolled = with_deadline(
            "budget.reset_period",
            timeout,
            self.ledger.reset_period(tenant_id, period),
        )
        .await?;
        info!(
            tenant_id = %tenant_id,
            previous_period = %state.period_start,
            period = %period,
            "Billing period rolled over"
        );
        if state.status == TenantStatus::Suspended {
            self.events
                .emit(ControlPlaneEvent::TenantReactivated { tenant_id })
                .await;
        }
        Ok(rolled)
    }

    /// Persist and announce an evaluation. Best-effort: the store's
    /// conditional increment enforces the hard limit even if this fails.
    async fn apply(&self, before: &BudgetState, after: &BudgetState, eval: Evaluation) {
        let timeout = self.config.store_timeout();
        let tenant_id = after.tenant_id;

        if eval.changes(after) {
            if let Err(e) = with_deadline(
                "budget.set_status",
                timeout,
                self.ledger
                    .set_status(tenant_id, eval.status, eval.alert_level),
            )
            .await
            {
                error!(tenant_id = %tenant_id, error = %e, "Failed to persist budget status");
            }
        }

        for pct in &eval.raised {
            let alert = with_deadline(
                "budget.append_alert",
                timeout,
                self.ledger.append_alert(CreateBudgetAlert {
                    tenant_id,
                    threshold_pct: *pct,
                    spend_at_alert: after.exposure(),
                    limit: after.limit,
                }),
            )
            .await;
            match alert {
                Ok(alert) => self.events.emit(ControlPlaneEvent::BudgetAlert(alert)).await,
                Err(e) => error!(
                    tenant_id = %tenant_id,
                    threshold_pct = pct,
                    error = %e,
                    "Failed to record budget alert"
                ),
            }
        }

        if eval.suspends(before.status) {
            warn!(
                tenant_id = %tenant_id,
                exposure = %after.exposure(),
                limit = %after.limit,
                "Tenant suspended at budget limit"
            );
            self.events
                .emit(ControlPlaneEvent::TenantSuspended {
                    tenant_id,
                    exposure: after.exposure(),
                    limit: after.limit,
                })
                .await;
            self.events
                .emit(ControlPlaneEvent::QuiesceRequested { tenant_id })
                .await;
        }
    }

    fn denial(&self, state: &BudgetState, requested: Money) -> TollgateError {
        TollgateError::BudgetExceeded(Box::new(BudgetDenial {
            tenant_id: state.tenant_id,
            limit: state.limit,
            committed: state.committed,
            reserved: state.reserved,
            requested,
            remaining: state.remaining(),
            period_resets_at: next_period_start(state.period_start),
            admin_contact: self.config.admin_contact.clone(),
        }))
    }

    /// Hold `estimated` against the tenant's budget before a paid call.
    ///
    /// A reservation that lands exactly on the limit succeeds and
    /// suspends the tenant; one that would exceed it is denied and
    /// suspends the tenant. Store timeouts deny.
    pub async fn reserve(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        estimated: Money,
    ) -> TollgateResult<Reservation> {
        if estimated.is_negative() {
            return Err(TollgateError::Validation {
                message: "estimated cost must not be negative".into(),
            });
        }
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;

        let before = self.current_state(tenant_id).await?;
        let reserved = with_deadline(
            "budget.try_reserve",
            self.config.store_timeout(),
            self.ledger.try_reserve(tenant_id, estimated),
        )
        .await?;

        match reserved {
            Some(after) => {
                let eval = thresholds::evaluate(&after, &self.config.soft_thresholds);
                self.apply(&before, &after, eval).await;
                let reservation = Reservation {
                    id: Uuid::new_v4(),
                    tenant_id,
                    account_id,
                    estimated,
                    period_start: after.period_start,
                    created_at: Utc::now(),
                };
                debug!(
                    tenant_id = %tenant_id,
                    reservation_id = %reservation.id,
                    estimated = %estimated,
                    "Spend reserved"
                );
                Ok(reservation)
            }
            None => {
                // Re-read: the conditional increment may have raced with
                // another process.
                let state = with_deadline(
                    "budget.get_state",
                    self.config.store_timeout(),
                    self.ledger.get_state(tenant_id),
                )
                .await
                .unwrap_or_else(|_| before.clone());
                if state.status != TenantStatus::Suspended {
                    let mut eval = thresholds::evaluate(&state, &self.config.soft_thresholds);
                    eval.status = TenantStatus::Suspended;
                    if state.alert_level < HARD_LIMIT_PCT
                        && !eval.raised.contains(&HARD_LIMIT_PCT)
                    {
                        eval.raised.push(HARD_LIMIT_PCT);
                    }
                    eval.alert_level = HARD_LIMIT_PCT;
                    self.apply(&state, &state, eval).await;
                }
                info!(
                    tenant_id = %tenant_id,
                    account_id = %account_id,
                    requested = %estimated,
                    remaining = %state.remaining(),
                    "Spend reservation denied"
                );
                Err(self.denial(&state, estimated))
            }
        }
    }

    /// Settle a reservation at the metered cost and append it to the
    /// spend ledger, as one store operation.
    ///
    /// The actual cost is recorded even when it exceeds the estimate; the
    /// tenant is then suspended going forward if the limit was reached.
    /// Committing the same reservation twice charges it once, so a commit
    /// that failed or timed out may be retried.
    pub async fn commit(
        &self,
        reservation: &Reservation,
        actual: Money,
        model: Option<&str>,
    ) -> TollgateResult<BudgetState> {
        if actual.is_negative() {
            return Err(TollgateError::Validation {
                message: "actual cost must not be negative".into(),
            });
        }
        let tenant_id = reservation.tenant_id;
        let timeout = self.config.store_timeout();
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;

        if actual > reservation.estimated {
            warn!(
                tenant_id = %tenant_id,
                reservation_id = %reservation.id,
                estimated = %reservation.estimated,
                actual = %actual,
                "Metered cost exceeded the reserved estimate"
            );
        }

        let before = with_deadline(
            "budget.get_state",
            timeout,
            self.ledger.get_state(tenant_id),
        )
        .await?;
        let committed = with_deadline(
            "budget.commit_reservation",
            timeout,
            self.ledger.commit_reservation(CommitReservation {
                tenant_id,
                account_id: reservation.account_id,
                reservation_id: reservation.id,
                estimated: reservation.estimated,
                actual,
                model: model.map(str::to_owned),
            }),
        )
        .await?;

        let Some(after) = committed else {
            debug!(
                tenant_id = %tenant_id,
                reservation_id = %reservation.id,
                "Reservation already committed"
            );
            return Ok(before);
        };

        let eval = thresholds::evaluate(&after, &self.config.soft_thresholds);
        self.apply(&before, &after, eval).await;
        debug!(
            tenant_id = %tenant_id,
            reservation_id = %reservation.id,
            actual = %actual,
            committed = %after.committed,
            "Spend committed"
        );
        Ok(after)
    }

    /// Return a reservation's estimate to the budget without charging.
    pub async fn release(&self, reservation: Reservation) -> TollgateResult<BudgetState> {
        let lock = self.tenant_lock(reservation.tenant_id);
        let _guard = lock.lock().await;
        let state = with_deadline(
            "budget.settle",
            self.config.store_timeout(),
            self.ledger
                .settle(reservation.tenant_id, reservation.estimated, Money::ZERO),
        )
        .await?;
        debug!(
            tenant_id = %reservation.tenant_id,
            reservation_id = %reservation.id,
            "Reservation released"
        );
        Ok(state)
    }

    /// Record a zero-cost, cache-served operation. Allowed while
    /// suspended.
    pub async fn record_cache_hit(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        model: Option<&str>,
    ) -> TollgateResult<SpendRecord> {
        with_deadline(
            "budget.append_spend",
            self.config.store_timeout(),
            self.ledger.append_spend(CreateSpendRecord {
                tenant_id,
                account_id,
                amount: Money::ZERO,
                cache_served: true,
                reservation_id: None,
                model: model.map(str::to_owned),
            }),
        )
        .await
    }

    pub async fn snapshot(&self, tenant_id: Uuid) -> TollgateResult<BudgetSnapshot> {
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;
        let state = self.current_state(tenant_id).await?;
        Ok(BudgetSnapshot::from(&state))
    }

    /// Lift a suspension. Alerts already raised for soft thresholds that
    /// are still exceeded stay raised.
    pub async fn reactivate(&self, tenant_id: Uuid) -> TollgateResult<BudgetSnapshot> {
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;
        let state = self.current_state(tenant_id).await?;
        let level = thresholds::soft_level(&state, &self.config.soft_thresholds);
        let status = if level > 0 {
            TenantStatus::Warned
        } else {
            TenantStatus::Active
        };
        let updated = with_deadline(
            "budget.set_status",
            self.config.store_timeout(),
            self.ledger.set_status(tenant_id, status, level),
        )
        .await?;
        info!(tenant_id = %tenant_id, status = ?status, "Tenant budget reactivated");
        if state.status == TenantStatus::Suspended {
            self.events
                .emit(ControlPlaneEvent::TenantReactivated { tenant_id })
                .await;
        }
        Ok(BudgetSnapshot::from(&updated))
    }

    pub async fn list_alerts(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<BudgetAlert>> {
        with_deadline(
            "budget.list_alerts",
            self.config.store_timeout(),
            self.ledger.list_alerts(tenant_id, pagination),
        )
        .await
    }

    pub async fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> TollgateResult<BudgetAlert> {
        with_deadline(
            "budget.acknowledge_alert",
            self.config.store_timeout(),
            self.ledger.acknowledge_alert(tenant_id, alert_id),
        )
        .await
    }

    /// Spend recorded in the current billing period.
    pub async fn list_spend(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<SpendRecord>> {
        let state = with_deadline(
            "budget.get_state",
            self.config.store_timeout(),
            self.ledger.get_state(tenant_id),
        )
        .await?;
        with_deadline(
            "budget.list_spend",
            self.config.store_timeout(),
            self.ledger
                .list_spend(tenant_id, state.period_start, pagination),
        )
        .await
    }
}
