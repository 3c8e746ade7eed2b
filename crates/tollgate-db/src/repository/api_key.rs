//! SurrealDB implementation of [`ApiKeyRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::api_key::{ApiKey, CreateApiKey};
use tollgate_core::repository::ApiKeyRepository;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ApiKeyRow {
    tenant_id: String,
    account_id: String,
    name: String,
    prefix: String,
    key_hash: String,
    scopes: Vec<String>,
    revoked: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_api_key(self, id: Uuid) -> Result<ApiKey, DbError> {
        Ok(ApiKey {
            id,
            tenant_id: parse_uuid("api_key", &self.tenant_id)?,
            account_id: parse_uuid("api_key", &self.account_id)?,
            name: self.name,
            prefix: self.prefix,
            key_hash: self.key_hash,
            scopes: self.scopes,
            revoked: self.revoked,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct ApiKeyRowWithId {
    record_id: String,
    tenant_id: String,
    account_id: String,
    name: String,
    prefix: String,
    key_hash: String,
    scopes: Vec<String>,
    revoked: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRowWithId {
    fn try_into_api_key(self) -> Result<ApiKey, DbError> {
        let id = parse_uuid("api_key", &self.record_id)?;
        ApiKeyRow {
            tenant_id: self.tenant_id,
            account_id: self.account_id,
            name: self.name,
            prefix: self.prefix,
            key_hash: self.key_hash,
            scopes: self.scopes,
            revoked: self.revoked,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
        .into_api_key(id)
    }
}

/// SurrealDB implementation of the API key repository. Only key hashes
/// are stored.
#[derive(Clone)]
pub struct SurrealApiKeyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealApiKeyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ApiKeyRepository for SurrealApiKeyRepository<C> {
    async fn create(&self, input: CreateApiKey) -> TollgateResult<ApiKey> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('api_key', $id) SET \
                 tenant_id = $tenant_id, \
                 account_id = $account_id, \
                 name = $name, \
                 prefix = $prefix, \
                 key_hash = $key_hash, \
                 scopes = $scopes, \
                 revoked = false, \
                 last_used_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("name", input.name))
            .bind(("prefix", input.prefix))
            .bind(("key_hash", input.key_hash))
            .bind(("scopes", input.scopes))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("api_key", e))?;

        let rows: Vec<ApiKeyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "api_key".into(),
            id: id_str,
        })?;

        Ok(row.into_api_key(id)?)
    }

    async fn get_by_hash(&self, key_hash: &str) -> TollgateResult<ApiKey> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM api_key \
                 WHERE key_hash = $key_hash",
            )
            .bind(("key_hash", key_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ApiKeyRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "api_key".into(),
            id: "hash".into(),
        })?;

        Ok(row.try_into_api_key()?)
    }

    async fn list_by_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> TollgateResult<Vec<ApiKey>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM api_key \
                 WHERE tenant_id = $tenant_id AND account_id = $account_id \
                 ORDER BY created_at ASC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ApiKeyRowWithId> = result.take(0).map_err(DbError::from)?;
        let keys = rows
            .into_iter()
            .map(ApiKeyRowWithId::try_into_api_key)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(keys)
    }

    async fn revoke(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('api_key', $id) SET revoked = true \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ApiKeyRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "api_key".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn touch(&self, tenant_id: Uuid, id: Uuid, at: DateTime<Utc>) -> TollgateResult<()> {
        self.db
            .query(
                "UPDATE type::record('api_key', $id) SET last_used_at = $at \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }
}
