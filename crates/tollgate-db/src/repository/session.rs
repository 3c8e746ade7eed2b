//! SurrealDB implementation of [`SessionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::session::{
    ClientOrigin, CreateSession, RevocationReason, RotateRefreshToken, Session,
};
use tollgate_core::repository::SessionRepository;
use uuid::Uuid;

use super::{CountRow, count_from, parse_uuid};
use crate::error::DbError;

fn reason_to_str(r: RevocationReason) -> &'static str {
    match r {
        RevocationReason::Logout => "Logout",
        RevocationReason::SignOutEverywhere => "SignOutEverywhere",
        RevocationReason::Evicted => "Evicted",
        RevocationReason::ReplayDetected => "ReplayDetected",
        RevocationReason::SuspiciousOrigin => "SuspiciousOrigin",
        RevocationReason::AccountDisabled => "AccountDisabled",
    }
}

fn parse_reason(s: &str) -> Result<RevocationReason, DbError> {
    match s {
        "Logout" => Ok(RevocationReason::Logout),
        "SignOutEverywhere" => Ok(RevocationReason::SignOutEverywhere),
        "Evicted" => Ok(RevocationReason::Evicted),
        "ReplayDetected" => Ok(RevocationReason::ReplayDetected),
        "SuspiciousOrigin" => Ok(RevocationReason::SuspiciousOrigin),
        "AccountDisabled" => Ok(RevocationReason::AccountDisabled),
        other => Err(DbError::corrupt(
            "session",
            format!("unknown revocation reason: {other}"),
        )),
    }
}

#[derive(Debug, SurrealValue)]
struct SessionRow {
    tenant_id: String,
    account_id: String,
    scopes: Vec<String>,
    refresh_token_id: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    revoked_reason: Option<String>,
}

impl SessionRow {
    fn into_session(self, id: Uuid) -> Result<Session, DbError> {
        Ok(Session {
            id,
            tenant_id: parse_uuid("session", &self.tenant_id)?,
            account_id: parse_uuid("session", &self.account_id)?,
            scopes: self.scopes,
            refresh_token_id: self.refresh_token_id,
            origin: ClientOrigin {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            expires_at: self.expires_at,
            revoked: self.revoked,
            revoked_reason: self.revoked_reason.as_deref().map(parse_reason).transpose()?,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    tenant_id: String,
    account_id: String,
    scopes: Vec<String>,
    refresh_token_id: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    revoked_reason: Option<String>,
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = parse_uuid("session", &self.record_id)?;
        SessionRow {
            tenant_id: self.tenant_id,
            account_id: self.account_id,
            scopes: self.scopes,
            refresh_token_id: self.refresh_token_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            expires_at: self.expires_at,
            revoked: self.revoked,
            revoked_reason: self.revoked_reason,
        }
        .into_session(id)
    }
}

/// SurrealDB implementation of the session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> TollgateResult<Session> {
        let id_str = input.id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('session', $id) SET \
                 tenant_id = $tenant_id, \
                 account_id = $account_id, \
                 scopes = $scopes, \
                 refresh_token_id = $refresh_token_id, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 expires_at = $expires_at, \
                 revoked = false, \
                 revoked_reason = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("scopes", input.scopes))
            .bind(("refresh_token_id", input.refresh_token_id))
            .bind(("ip_address", input.origin.ip_address))
            .bind(("user_agent", input.origin.user_agent))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("session", e))?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row.into_session(input.id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<Session> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('session', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row.into_session(id)?)
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> TollgateResult<Vec<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE tenant_id = $tenant_id AND account_id = $account_id \
                 AND revoked = false AND expires_at > $now \
                 ORDER BY last_activity_at ASC, created_at ASC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let sessions = rows
            .into_iter()
            .map(SessionRowWithId::try_into_session)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(sessions)
    }

    async fn rotate_refresh_token(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: RotateRefreshToken,
    ) -> TollgateResult<Option<Session>> {
        // The WHERE clause makes this a single-record compare-and-swap.
        // A missing origin field keeps the recorded value.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('session', $id) SET \
                 refresh_token_id = $new_token_id, \
                 ip_address = $ip_address ?? ip_address, \
                 user_agent = $user_agent ?? user_agent, \
                 expires_at = $expires_at, \
                 last_activity_at = $now \
                 WHERE tenant_id = $tenant_id \
                 AND refresh_token_id = $expected_token_id \
                 AND revoked = false",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("expected_token_id", input.expected_token_id))
            .bind(("new_token_id", input.new_token_id))
            .bind(("ip_address", input.origin.ip_address))
            .bind(("user_agent", input.origin.user_agent))
            .bind(("expires_at", input.expires_at))
            .bind(("now", input.now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.into_session(id)?)),
            None => Ok(None),
        }
    }

    async fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: RevocationReason,
    ) -> TollgateResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('session', $id) SET \
                 revoked = true, revoked_reason = $reason \
                 WHERE tenant_id = $tenant_id AND revoked = false",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("reason", reason_to_str(reason)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn revoke_account_sessions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        except: Option<Uuid>,
        reason: RevocationReason,
    ) -> TollgateResult<u64> {
        let mut result = self
            .db
            .query(
                "UPDATE session SET revoked = true, revoked_reason = $reason \
                 WHERE tenant_id = $tenant_id AND account_id = $account_id \
                 AND revoked = false AND meta::id(id) != $except",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .bind(("except", except.map(|id| id.to_string()).unwrap_or_default()))
            .bind(("reason", reason_to_str(reason)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn cleanup_expired(&self, tenant_id: Uuid, now: DateTime<Utc>) -> TollgateResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM session \
                 WHERE tenant_id = $tenant_id AND expires_at < $now \
                 GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        self.db
            .query("DELETE session WHERE tenant_id = $tenant_id AND expires_at < $now")
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
