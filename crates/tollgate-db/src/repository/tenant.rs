//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use tollgate_core::money::Money;
use tollgate_core::period::period_start_of;
use tollgate_core::repository::{PaginatedResult, Pagination, TenantRepository};
use uuid::Uuid;

use super::{CountRow, count_from, parse_uuid};
use crate::error::DbError;

pub(super) fn parse_status(s: &str) -> Result<TenantStatus, DbError> {
    match s {
        "Active" => Ok(TenantStatus::Active),
        "Warned" => Ok(TenantStatus::Warned),
        "Suspended" => Ok(TenantStatus::Suspended),
        other => Err(DbError::corrupt("tenant", format!("unknown status: {other}"))),
    }
}

pub(super) fn status_to_str(s: TenantStatus) -> &'static str {
    match s {
        TenantStatus::Active => "Active",
        TenantStatus::Warned => "Warned",
        TenantStatus::Suspended => "Suspended",
    }
}

/// Row for queries where the record id is already known.
#[derive(Debug, SurrealValue)]
pub(super) struct TenantRow {
    name: String,
    slug: String,
    allowed_scopes: Vec<String>,
    budget_limit: i64,
    committed_spend: i64,
    reserved_spend: i64,
    period_start: DateTime<Utc>,
    status: String,
    alert_level: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    pub(super) fn into_tenant(self, id: Uuid) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id,
            name: self.name,
            slug: self.slug,
            allowed_scopes: self.allowed_scopes,
            budget_limit: Money::from_micros(self.budget_limit),
            committed_spend: Money::from_micros(self.committed_spend),
            reserved_spend: Money::from_micros(self.reserved_spend),
            period_start: self.period_start,
            status: parse_status(&self.status)?,
            alert_level: u8::try_from(self.alert_level)
                .map_err(|e| DbError::corrupt("tenant", e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row that carries the record id via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    slug: String,
    allowed_scopes: Vec<String>,
    budget_limit: i64,
    committed_spend: i64,
    reserved_spend: i64,
    period_start: DateTime<Utc>,
    status: String,
    alert_level: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        let id = parse_uuid("tenant", &self.record_id)?;
        TenantRow {
            name: self.name,
            slug: self.slug,
            allowed_scopes: self.allowed_scopes,
            budget_limit: self.budget_limit,
            committed_spend: self.committed_spend,
            reserved_spend: self.reserved_spend,
            period_start: self.period_start,
            status: self.status,
            alert_level: self.alert_level,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_tenant(id)
    }
}

/// SurrealDB implementation of the tenant directory.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> TollgateResult<Tenant> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('tenant', $id) SET \
                 name = $name, slug = $slug, \
                 allowed_scopes = $allowed_scopes, \
                 budget_limit = $budget_limit, \
                 committed_spend = 0, reserved_spend = 0, \
                 period_start = $period_start, \
                 status = 'Active', alert_level = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("slug", input.slug))
            .bind(("allowed_scopes", input.allowed_scopes))
            .bind(("budget_limit", input.budget_limit.micros()))
            .bind(("period_start", period_start_of(Utc::now())))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("tenant", e))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TollgateResult<Tenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_by_slug(&self, slug: &str) -> TollgateResult<Tenant> {
        let slug_owned = slug.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM tenant WHERE slug = $slug")
            .bind(("slug", slug_owned))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: format!("slug={slug}"),
        })?;

        Ok(row.try_into_tenant()?)
    }

    async fn update(&self, id: Uuid, input: UpdateTenant) -> TollgateResult<Tenant> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.allowed_scopes.is_some() {
            sets.push("allowed_scopes = $allowed_scopes");
        }
        if input.budget_limit.is_some() {
            sets.push("budget_limit = $budget_limit");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('tenant', $id) SET {}",
            sets.join(", ")
        );
        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(scopes) = input.allowed_scopes {
            builder = builder.bind(("allowed_scopes", scopes));
        }
        if let Some(limit) = input.budget_limit {
            builder = builder.bind(("budget_limit", limit.micros()));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("tenant", e))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn list(&self, pagination: Pagination) -> TollgateResult<PaginatedResult<Tenant>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM tenant GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(TenantRowWithId::try_into_tenant)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
