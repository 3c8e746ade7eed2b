//! SurrealDB implementation of [`AuditLogRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::audit::{AuditEvent, AuditEventKind, CreateAuditEvent};
use tollgate_core::models::session::ClientOrigin;
use tollgate_core::repository::{
    AuditEventFilter, AuditLogRepository, PaginatedResult, Pagination,
};
use uuid::Uuid;

use super::{CountRow, count_from, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

fn kind_to_str(k: AuditEventKind) -> &'static str {
    match k {
        AuditEventKind::LoginFailed => "LoginFailed",
        AuditEventKind::AccountLocked => "AccountLocked",
        AuditEventKind::RefreshReplay => "RefreshReplay",
        AuditEventKind::SuspiciousOrigin => "SuspiciousOrigin",
        AuditEventKind::SessionEvicted => "SessionEvicted",
        AuditEventKind::CrossTenantAccess => "CrossTenantAccess",
        AuditEventKind::ScopeDenied => "ScopeDenied",
    }
}

fn parse_kind(s: &str) -> Result<AuditEventKind, DbError> {
    match s {
        "LoginFailed" => Ok(AuditEventKind::LoginFailed),
        "AccountLocked" => Ok(AuditEventKind::AccountLocked),
        "RefreshReplay" => Ok(AuditEventKind::RefreshReplay),
        "SuspiciousOrigin" => Ok(AuditEventKind::SuspiciousOrigin),
        "SessionEvicted" => Ok(AuditEventKind::SessionEvicted),
        "CrossTenantAccess" => Ok(AuditEventKind::CrossTenantAccess),
        "ScopeDenied" => Ok(AuditEventKind::ScopeDenied),
        other => Err(DbError::corrupt(
            "audit_event",
            format!("unknown kind: {other}"),
        )),
    }
}

#[derive(Debug, SurrealValue)]
struct AuditEventRow {
    tenant_id: String,
    actor_id: Option<String>,
    session_id: Option<String>,
    kind: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditEventRow {
    fn into_event(self, id: Uuid) -> Result<AuditEvent, DbError> {
        Ok(AuditEvent {
            id,
            tenant_id: parse_uuid("audit_event", &self.tenant_id)?,
            actor_id: parse_opt_uuid("audit_event", self.actor_id)?,
            session_id: parse_opt_uuid("audit_event", self.session_id)?,
            kind: parse_kind(&self.kind)?,
            origin: ClientOrigin {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            metadata: self.metadata,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct AuditEventRowWithId {
    record_id: String,
    tenant_id: String,
    actor_id: Option<String>,
    session_id: Option<String>,
    kind: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditEventRowWithId {
    fn try_into_event(self) -> Result<AuditEvent, DbError> {
        let id = parse_uuid("audit_event", &self.record_id)?;
        AuditEventRow {
            tenant_id: self.tenant_id,
            actor_id: self.actor_id,
            session_id: self.session_id,
            kind: self.kind,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
        .into_event(id)
    }
}

/// SurrealDB implementation of the append-only security audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

/// Build the WHERE clause for an audit filter. Only fixed clause text is
/// interpolated; values are always bound.
fn filter_clause(filter: &AuditEventFilter) -> String {
    let mut clauses = vec!["tenant_id = $tenant_id"];
    if filter.actor_id.is_some() {
        clauses.push("actor_id = $actor_id");
    }
    if filter.kind.is_some() {
        clauses.push("kind = $kind");
    }
    if filter.from.is_some() {
        clauses.push("timestamp >= $from");
    }
    if filter.to.is_some() {
        clauses.push("timestamp <= $to");
    }
    clauses.join(" AND ")
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditEvent) -> TollgateResult<AuditEvent> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_event', $id) SET \
                 tenant_id = $tenant_id, \
                 actor_id = $actor_id, \
                 session_id = $session_id, \
                 kind = $kind, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 metadata = $metadata",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("actor_id", input.actor_id.map(|a| a.to_string())))
            .bind(("session_id", input.session_id.map(|s| s.to_string())))
            .bind(("kind", kind_to_str(input.kind)))
            .bind(("ip_address", input.origin.ip_address))
            .bind(("user_agent", input.origin.user_agent))
            .bind(("metadata", input.metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("audit_event", e))?;

        let rows: Vec<AuditEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_event".into(),
            id: id_str,
        })?;

        Ok(row.into_event(id)?)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: AuditEventFilter,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<AuditEvent>> {
        let where_clause = filter_clause(&filter);
        let count_query =
            format!("SELECT count() AS total FROM audit_event WHERE {where_clause} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM audit_event \
             WHERE {where_clause} \
             ORDER BY timestamp ASC \
             LIMIT $limit START $offset"
        );

        let actor_id = filter.actor_id.map(|a| a.to_string());
        let kind = filter.kind.map(|k| kind_to_str(k).to_string());

        let mut result = self
            .db
            .query(&count_query)
            .query(&list_query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("actor_id", actor_id))
            .bind(("kind", kind))
            .bind(("from", filter.from))
            .bind(("to", filter.to))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        let rows: Vec<AuditEventRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AuditEventRowWithId::try_into_event)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clause_includes_only_set_fields() {
        let clause = filter_clause(&AuditEventFilter {
            kind: Some(AuditEventKind::RefreshReplay),
            ..Default::default()
        });
        assert_eq!(clause, "tenant_id = $tenant_id AND kind = $kind");
    }
}
