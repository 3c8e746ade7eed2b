//! SurrealDB implementation of [`BudgetLedgerRepository`].
//!
//! Running totals live on the `tenant` record; spend records and alerts
//! are separate append-mostly tables.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::models::budget::{
    BudgetAlert, BudgetState, CommitReservation, CreateBudgetAlert, CreateSpendRecord,
    SpendRecord,
};
use tollgate_core::models::tenant::TenantStatus;
use tollgate_core::money::Money;
use tollgate_core::repository::{BudgetLedgerRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use super::tenant::{TenantRow, status_to_str};
use super::{CountRow, count_from, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SpendRecordRow {
    tenant_id: String,
    account_id: String,
    amount: i64,
    cache_served: bool,
    reservation_id: Option<String>,
    model: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl SpendRecordRow {
    fn into_record(self, id: Uuid) -> Result<SpendRecord, DbError> {
        Ok(SpendRecord {
            id,
            tenant_id: parse_uuid("spend_record", &self.tenant_id)?,
            account_id: parse_uuid("spend_record", &self.account_id)?,
            amount: Money::from_micros(self.amount),
            cache_served: self.cache_served,
            reservation_id: parse_opt_uuid("spend_record", self.reservation_id)?,
            model: self.model,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct SpendRecordRowWithId {
    record_id: String,
    tenant_id: String,
    account_id: String,
    amount: i64,
    cache_served: bool,
    reservation_id: Option<String>,
    model: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl SpendRecordRowWithId {
    fn try_into_record(self) -> Result<SpendRecord, DbError> {
        let id = parse_uuid("spend_record", &self.record_id)?;
        SpendRecordRow {
            tenant_id: self.tenant_id,
            account_id: self.account_id,
            amount: self.amount,
            cache_served: self.cache_served,
            reservation_id: self.reservation_id,
            model: self.model,
            recorded_at: self.recorded_at,
        }
        .into_record(id)
    }
}

#[derive(Debug, SurrealValue)]
struct BudgetAlertRow {
    tenant_id: String,
    threshold_pct: u32,
    spend_at_alert: i64,
    limit_amount: i64,
    acknowledged: bool,
    created_at: DateTime<Utc>,
}

impl BudgetAlertRow {
    fn into_alert(self, id: Uuid) -> Result<BudgetAlert, DbError> {
        Ok(BudgetAlert {
            id,
            tenant_id: parse_uuid("budget_alert", &self.tenant_id)?,
            threshold_pct: u8::try_from(self.threshold_pct)
                .map_err(|e| DbError::corrupt("budget_alert", e))?,
            spend_at_alert: Money::from_micros(self.spend_at_alert),
            limit: Money::from_micros(self.limit_amount),
            acknowledged: self.acknowledged,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct BudgetAlertRowWithId {
    record_id: String,
    tenant_id: String,
    threshold_pct: u32,
    spend_at_alert: i64,
    limit_amount: i64,
    acknowledged: bool,
    created_at: DateTime<Utc>,
}

impl BudgetAlertRowWithId {
    fn try_into_alert(self) -> Result<BudgetAlert, DbError> {
        let id = parse_uuid("budget_alert", &self.record_id)?;
        BudgetAlertRow {
            tenant_id: self.tenant_id,
            threshold_pct: self.threshold_pct,
            spend_at_alert: self.spend_at_alert,
            limit_amount: self.limit_amount,
            acknowledged: self.acknowledged,
            created_at: self.created_at,
        }
        .into_alert(id)
    }
}

fn tenant_not_found(tenant_id: Uuid) -> DbError {
    DbError::NotFound {
        entity: "tenant".into(),
        id: tenant_id.to_string(),
    }
}

fn first_state(rows: Vec<TenantRow>, tenant_id: Uuid) -> Result<BudgetState, DbError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| tenant_not_found(tenant_id))?;
    Ok(row.into_tenant(tenant_id)?.budget_state())
}

/// SurrealDB implementation of the budget ledger.
#[derive(Clone)]
pub struct SurrealBudgetLedgerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealBudgetLedgerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> BudgetLedgerRepository for SurrealBudgetLedgerRepository<C> {
    async fn get_state(&self, tenant_id: Uuid) -> TollgateResult<BudgetState> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant', $id)")
            .bind(("id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_state(rows, tenant_id)?)
    }

    async fn try_reserve(
        &self,
        tenant_id: Uuid,
        amount: Money,
    ) -> TollgateResult<Option<BudgetState>> {
        // Conditional increment: the check and the write happen in one
        // statement against one record.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 reserved_spend += $amount, updated_at = time::now() \
                 WHERE status != 'Suspended' \
                 AND committed_spend + reserved_spend + $amount <= budget_limit",
            )
            .bind(("id", tenant_id.to_string()))
            .bind(("amount", amount.micros()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            // Distinguish "refused" from "no such tenant".
            self.get_state(tenant_id).await?;
            return Ok(None);
        }
        Ok(Some(first_state(rows, tenant_id)?))
    }

    async fn settle(
        &self,
        tenant_id: Uuid,
        release: Money,
        commit: Money,
    ) -> TollgateResult<BudgetState> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 reserved_spend = math::max([0, reserved_spend - $release]), \
                 committed_spend += $commit, \
                 updated_at = time::now()",
            )
            .bind(("id", tenant_id.to_string()))
            .bind(("release", release.micros()))
            .bind(("commit", commit.micros()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_state(rows, tenant_id)?)
    }

    async fn set_status(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
        alert_level: u8,
    ) -> TollgateResult<BudgetState> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 status = $status, alert_level = $alert_level, \
                 updated_at = time::now()",
            )
            .bind(("id", tenant_id.to_string()))
            .bind(("status", status_to_str(status)))
            .bind(("alert_level", u32::from(alert_level)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_state(rows, tenant_id)?)
    }

    async fn reset_period(
        &self,
        tenant_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> TollgateResult<BudgetState> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 committed_spend = 0, period_start = $period_start, \
                 status = 'Active', alert_level = 0, \
                 updated_at = time::now()",
            )
            .bind(("id", tenant_id.to_string()))
            .bind(("period_start", period_start))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_state(rows, tenant_id)?)
    }

    async fn append_spend(&self, input: CreateSpendRecord) -> TollgateResult<SpendRecord> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('spend_record', $id) SET \
                 tenant_id = $tenant_id, \
                 account_id = $account_id, \
                 amount = $amount, \
                 cache_served = $cache_served, \
                 reservation_id = $reservation_id, \
                 model = $model",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("amount", input.amount.micros()))
            .bind(("cache_served", input.cache_served))
            .bind((
                "reservation_id",
                input.reservation_id.map(|r| r.to_string()),
            ))
            .bind(("model", input.model))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("spend_record", e))?;

        let rows: Vec<SpendRecordRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "spend_record".into(),
            id: id_str,
        })?;

        Ok(row.into_record(id)?)
    }

    async fn commit_reservation(
        &self,
        input: CommitReservation,
    ) -> TollgateResult<Option<BudgetState>> {
        // The spend record's id is the reservation id, so a second commit
        // of the same reservation fails the CREATE and rolls back the
        // whole transaction.
        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 CREATE type::record('spend_record', $reservation_id) SET \
                 tenant_id = $tenant_id, \
                 account_id = $account_id, \
                 amount = $actual, \
                 cache_served = false, \
                 reservation_id = $reservation_id, \
                 model = $model; \
                 UPDATE type::record('tenant', $tenant_id) SET \
                 reserved_spend = math::max([0, reserved_spend - $estimated]), \
                 committed_spend += $actual, \
                 updated_at = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("reservation_id", input.reservation_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("actual", input.actual.micros()))
            .bind(("estimated", input.estimated.micros()))
            .bind(("model", input.model))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                return match DbError::from_statement("spend_record", e) {
                    DbError::AlreadyExists { .. } => Ok(None),
                    other => Err(TollgateError::from(other)),
                };
            }
        };

        let rows: Vec<TenantRow> = result.take(1).map_err(DbError::from)?;
        Ok(Some(first_state(rows, input.tenant_id)?))
    }

    async fn list_spend(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<SpendRecord>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM spend_record \
                 WHERE tenant_id = $tenant_id AND recorded_at >= $since \
                 GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM spend_record \
                 WHERE tenant_id = $tenant_id AND recorded_at >= $since \
                 ORDER BY recorded_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("since", since))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SpendRecordRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(SpendRecordRowWithId::try_into_record)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn append_alert(&self, input: CreateBudgetAlert) -> TollgateResult<BudgetAlert> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('budget_alert', $id) SET \
                 tenant_id = $tenant_id, \
                 threshold_pct = $threshold_pct, \
                 spend_at_alert = $spend_at_alert, \
                 limit_amount = $limit_amount, \
                 acknowledged = false",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("threshold_pct", u32::from(input.threshold_pct)))
            .bind(("spend_at_alert", input.spend_at_alert.micros()))
            .bind(("limit_amount", input.limit.micros()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("budget_alert", e))?;

        let rows: Vec<BudgetAlertRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "budget_alert".into(),
            id: id_str,
        })?;

        Ok(row.into_alert(id)?)
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<BudgetAlert>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM budget_alert \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM budget_alert \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BudgetAlertRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(BudgetAlertRowWithId::try_into_alert)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> TollgateResult<BudgetAlert> {
        let id_str = alert_id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('budget_alert', $id) SET acknowledged = true \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BudgetAlertRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "budget_alert".into(),
            id: id_str,
        })?;

        Ok(row.into_alert(alert_id)?)
    }
}
