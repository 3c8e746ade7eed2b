//! SurrealDB implementation of [`CacheRepository`].
//!
//! Record ids are derived from `(tenant_id, cache_key)`, so the same
//! fingerprint stored by two tenants lands in two distinct records.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::cache_entry::{CacheEntry, CacheKey, StoreCacheEntry, TokenUsage};
use tollgate_core::money::Money;
use tollgate_core::repository::CacheRepository;
use uuid::Uuid;

use super::{CountRow, count_from, parse_uuid};
use crate::error::DbError;

fn record_key(tenant_id: Uuid, key: &CacheKey) -> String {
    format!("{tenant_id}_{key}")
}

#[derive(Debug, SurrealValue)]
struct CacheEntryRow {
    tenant_id: String,
    cache_key: String,
    model: String,
    payload: serde_json::Value,
    prompt_tokens: u32,
    completion_tokens: u32,
    cost: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    hit_count: u64,
    last_hit_at: Option<DateTime<Utc>>,
}

impl CacheEntryRow {
    fn into_entry(self) -> Result<CacheEntry, DbError> {
        Ok(CacheEntry {
            key: CacheKey::new(self.cache_key),
            tenant_id: parse_uuid("cache_entry", &self.tenant_id)?,
            model: self.model,
            payload: self.payload,
            usage: TokenUsage {
                prompt_tokens: self.prompt_tokens,
                completion_tokens: self.completion_tokens,
            },
            cost: Money::from_micros(self.cost),
            created_at: self.created_at,
            expires_at: self.expires_at,
            hit_count: self.hit_count,
            last_hit_at: self.last_hit_at,
        })
    }
}

/// SurrealDB implementation of the response cache store.
#[derive(Clone)]
pub struct SurrealCacheRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCacheRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CacheRepository for SurrealCacheRepository<C> {
    async fn record_hit(
        &self,
        tenant_id: Uuid,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> TollgateResult<Option<CacheEntry>> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('cache_entry', $rid) SET \
                 hit_count += 1, last_hit_at = $now \
                 WHERE tenant_id = $tenant_id AND expires_at > $now",
            )
            .bind(("rid", record_key(tenant_id, key)))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CacheEntryRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.into_entry()?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, input: StoreCacheEntry) -> TollgateResult<CacheEntry> {
        let rid = record_key(input.tenant_id, &input.key);

        let result = self
            .db
            .query(
                "UPSERT type::record('cache_entry', $rid) SET \
                 tenant_id = $tenant_id, \
                 cache_key = $cache_key, \
                 model = $model, \
                 payload = $payload, \
                 prompt_tokens = $prompt_tokens, \
                 completion_tokens = $completion_tokens, \
                 cost = $cost, \
                 created_at = time::now(), \
                 expires_at = $expires_at, \
                 hit_count = 0, \
                 last_hit_at = NONE",
            )
            .bind(("rid", rid.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("cache_key", input.key.as_str().to_string()))
            .bind(("model", input.model))
            .bind(("payload", input.payload))
            .bind(("prompt_tokens", input.usage.prompt_tokens))
            .bind(("completion_tokens", input.usage.completion_tokens))
            .bind(("cost", input.cost.micros()))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("cache_entry", e))?;

        let rows: Vec<CacheEntryRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "cache_entry".into(),
            id: rid,
        })?;

        Ok(row.into_entry()?)
    }

    async fn delete(&self, tenant_id: Uuid, key: &CacheKey) -> TollgateResult<bool> {
        let mut result = self
            .db
            .query(
                "DELETE type::record('cache_entry', $rid) \
                 WHERE tenant_id = $tenant_id RETURN BEFORE",
            )
            .bind(("rid", record_key(tenant_id, key)))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CacheEntryRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> TollgateResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM cache_entry \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        self.db
            .query("DELETE cache_entry WHERE tenant_id = $tenant_id")
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> TollgateResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM cache_entry \
                 WHERE expires_at <= $now GROUP ALL",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_from(count_rows);

        self.db
            .query("DELETE cache_entry WHERE expires_at <= $now")
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
