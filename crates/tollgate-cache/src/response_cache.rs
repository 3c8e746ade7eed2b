//! The tenant-scoped response cache.
//!
//! Lookups never fail: any store error or timeout is reported as a miss
//! so the caller falls through to the paid path. Writes are best-effort.

use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tollgate_core::deadline::with_deadline;
use tollgate_core::error::TollgateResult;
use tollgate_core::models::cache_entry::{CacheEntry, CacheKey, StoreCacheEntry};
use tollgate_core::models::completion::CompletionResponse;
use tollgate_core::repository::CacheRepository;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Box<CacheEntry>),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

pub struct ResponseCache<R> {
    repo: R,
    config: CacheConfig,
}

impl<R: CacheRepository> ResponseCache<R> {
    pub fn new(repo: R, config: CacheConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key` in `tenant_id`. A hit bumps the entry's hit counter.
    pub async fn lookup(&self, tenant_id: Uuid, key: &CacheKey) -> CacheLookup {
        let lookup = timeout(
            self.config.lookup_timeout(),
            self.repo.record_hit(tenant_id, key, Utc::now()),
        )
        .await;
        match lookup {
            Ok(Ok(Some(entry))) => {
                debug!(tenant_id = %tenant_id, key = %key, hits = entry.hit_count, "Cache hit");
                CacheLookup::Hit(Box::new(entry))
            }
            Ok(Ok(None)) => CacheLookup::Miss,
            Ok(Err(e)) => {
                warn!(
                    tenant_id = %tenant_id,
                    key = %key,
                    error = %e,
                    "Cache lookup failed; treating as miss"
                );
                CacheLookup::Miss
            }
            Err(_) => {
                warn!(
                    tenant_id = %tenant_id,
                    key = %key,
                    "Cache lookup timed out; treating as miss"
                );
                CacheLookup::Miss
            }
        }
    }

    /// Store the result of a successful paid call. Last writer wins.
    /// Failures are logged and swallowed.
    pub async fn store(
        &self,
        tenant_id: Uuid,
        key: CacheKey,
        model: &str,
        response: &CompletionResponse,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            warn!(tenant_id = %tenant_id, "Cache TTL out of range; response not cached");
            return;
        };
        let input = StoreCacheEntry {
            key,
            tenant_id,
            model: model.to_owned(),
            payload: response.payload.clone(),
            usage: response.usage,
            cost: response.cost,
            expires_at: Utc::now() + ttl,
        };
        let result = with_deadline(
            "cache.upsert",
            self.config.store_timeout(),
            self.repo.upsert(input),
        )
        .await;
        match result {
            Ok(entry) => debug!(
                tenant_id = %tenant_id,
                key = %entry.key,
                expires_at = %entry.expires_at,
                "Response cached"
            ),
            Err(e) => warn!(tenant_id = %tenant_id, error = %e, "Failed to cache response"),
        }
    }

    /// Drop every entry belonging to a tenant.
    pub async fn purge(&self, tenant_id: Uuid) -> TollgateResult<u64> {
        let removed = with_deadline(
            "cache.delete_tenant",
            self.config.store_timeout(),
            self.repo.delete_tenant(tenant_id),
        )
        .await?;
        info!(tenant_id = %tenant_id, removed, "Tenant cache purged");
        Ok(removed)
    }

    pub async fn purge_key(&self, tenant_id: Uuid, key: &CacheKey) -> TollgateResult<bool> {
        with_deadline(
            "cache.delete",
            self.config.store_timeout(),
            self.repo.delete(tenant_id, key),
        )
        .await
    }

    /// Maintenance sweep across all tenants.
    pub async fn evict_expired(&self) -> TollgateResult<u64> {
        let removed = with_deadline(
            "cache.delete_expired",
            self.config.store_timeout(),
            self.repo.delete_expired(Utc::now()),
        )
        .await?;
        if removed > 0 {
            info!(removed, "Expired cache entries evicted");
        }
        Ok(removed)
    }
}
