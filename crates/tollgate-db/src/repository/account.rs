//! SurrealDB implementation of [`AccountRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::account::{
    Account, AccountKind, AccountStatus, CreateAccount, UpdateAccount,
};
use tollgate_core::repository::{AccountRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use super::{CountRow, count_from, parse_uuid};
use crate::error::DbError;

fn parse_status(s: &str) -> Result<AccountStatus, DbError> {
    match s {
        "Active" => Ok(AccountStatus::Active),
        "Locked" => Ok(AccountStatus::Locked),
        "Disabled" => Ok(AccountStatus::Disabled),
        other => Err(DbError::corrupt("account", format!("unknown status: {other}"))),
    }
}

fn status_to_str(s: AccountStatus) -> &'static str {
    match s {
        AccountStatus::Active => "Active",
        AccountStatus::Locked => "Locked",
        AccountStatus::Disabled => "Disabled",
    }
}

fn parse_kind(s: &str) -> Result<AccountKind, DbError> {
    match s {
        "Human" => Ok(AccountKind::Human),
        "Service" => Ok(AccountKind::Service),
        other => Err(DbError::corrupt("account", format!("unknown kind: {other}"))),
    }
}

fn kind_to_str(k: AccountKind) -> &'static str {
    match k {
        AccountKind::Human => "Human",
        AccountKind::Service => "Service",
    }
}

#[derive(Debug, SurrealValue)]
struct AccountRow {
    tenant_id: String,
    username: String,
    email: String,
    credential_hash: String,
    kind: String,
    status: String,
    scopes: Vec<String>,
    failed_login_attempts: u32,
    lockout_count: u32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self, id: Uuid) -> Result<Account, DbError> {
        Ok(Account {
            id,
            tenant_id: parse_uuid("account", &self.tenant_id)?,
            username: self.username,
            email: self.email,
            credential_hash: self.credential_hash,
            kind: parse_kind(&self.kind)?,
            status: parse_status(&self.status)?,
            scopes: self.scopes,
            failed_login_attempts: self.failed_login_attempts,
            lockout_count: self.lockout_count,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct AccountRowWithId {
    record_id: String,
    tenant_id: String,
    username: String,
    email: String,
    credential_hash: String,
    kind: String,
    status: String,
    scopes: Vec<String>,
    failed_login_attempts: u32,
    lockout_count: u32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRowWithId {
    fn try_into_account(self) -> Result<Account, DbError> {
        let id = parse_uuid("account", &self.record_id)?;
        AccountRow {
            tenant_id: self.tenant_id,
            username: self.username,
            email: self.email,
            credential_hash: self.credential_hash,
            kind: self.kind,
            status: self.status,
            scopes: self.scopes,
            failed_login_attempts: self.failed_login_attempts,
            lockout_count: self.lockout_count,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_account(id)
    }
}

/// SurrealDB implementation of the account repository.
///
/// Credential hashing happens in the auth layer; this repository only
/// stores the resulting PHC string.
#[derive(Clone)]
pub struct SurrealAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_one(
        &self,
        tenant_id: Uuid,
        field: &'static str,
        value: &str,
    ) -> TollgateResult<Account> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM account \
             WHERE tenant_id = $tenant_id AND {field} = $value"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("value", value.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: format!("{field}={value}"),
        })?;

        Ok(row.try_into_account()?)
    }
}

impl<C: Connection> AccountRepository for SurrealAccountRepository<C> {
    async fn create(&self, input: CreateAccount) -> TollgateResult<Account> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 tenant_id = $tenant_id, \
                 username = $username, \
                 email = $email, \
                 credential_hash = $credential_hash, \
                 kind = $kind, \
                 status = 'Active', \
                 scopes = $scopes, \
                 failed_login_attempts = 0, \
                 lockout_count = 0, \
                 locked_until = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("username", input.username))
            .bind(("email", input.email))
            .bind(("credential_hash", input.credential_hash))
            .bind(("kind", kind_to_str(input.kind)))
            .bind(("scopes", input.scopes))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("account", e))?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<Account> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('account', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id)?)
    }

    async fn get_by_username(&self, tenant_id: Uuid, username: &str) -> TollgateResult<Account> {
        self.find_one(tenant_id, "username", username).await
    }

    async fn get_by_email(&self, tenant_id: Uuid, email: &str) -> TollgateResult<Account> {
        self.find_one(tenant_id, "email", email).await
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateAccount,
    ) -> TollgateResult<Account> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.credential_hash.is_some() {
            sets.push("credential_hash = $credential_hash");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.scopes.is_some() {
            sets.push("scopes = $scopes");
        }
        if input.failed_login_attempts.is_some() {
            sets.push("failed_login_attempts = $failed_login_attempts");
        }
        if input.lockout_count.is_some() {
            sets.push("lockout_count = $lockout_count");
        }
        if input.locked_until.is_some() {
            sets.push("locked_until = $locked_until");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('account', $id) SET {} \
             WHERE tenant_id = $tenant_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()));

        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(hash) = input.credential_hash {
            builder = builder.bind(("credential_hash", hash));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status_to_str(status)));
        }
        if let Some(scopes) = input.scopes {
            builder = builder.bind(("scopes", scopes));
        }
        if let Some(attempts) = input.failed_login_attempts {
            builder = builder.bind(("failed_login_attempts", attempts));
        }
        if let Some(count) = input.lockout_count {
            builder = builder.bind(("lockout_count", count));
        }
        if let Some(locked_until) = input.locked_until {
            // Some(None) clears the lock.
            builder = builder.bind(("locked_until", locked_until));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("account", e))?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id)?)
    }

    async fn disable(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('account', $id) SET \
                 status = 'Disabled', updated_at = time::now() \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "account".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<Account>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM account \
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
                "SELECT meta::id(id) AS record_id, * FROM account \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AccountRowWithId::try_into_account)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
