//! In-memory storage backend.
//!
//! Implements every repository trait over `tokio::sync::RwLock`-guarded
//! maps. Each conditional operation (budget check-and-increment,
//! refresh-token compare-and-swap) runs under a single write lock, which
//! gives it the same atomicity the SurrealDB backend gets from
//! conditional `UPDATE ... WHERE`. Intended for tests and local
//! development; data is lost when the last clone is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::models::account::{Account, AccountStatus, CreateAccount, UpdateAccount};
use tollgate_core::models::api_key::{ApiKey, CreateApiKey};
use tollgate_core::models::audit::{AuditEvent, CreateAuditEvent};
use tollgate_core::models::budget::{
    BudgetAlert, BudgetState, CommitReservation, CreateBudgetAlert, CreateSpendRecord,
    SpendRecord,
};
use tollgate_core::models::cache_entry::{CacheEntry, CacheKey, StoreCacheEntry};
use tollgate_core::models::session::{CreateSession, RevocationReason, RotateRefreshToken, Session};
use tollgate_core::models::tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use tollgate_core::money::Money;
use tollgate_core::repository::{
    AccountRepository, ApiKeyRepository, AuditEventFilter, AuditLogRepository,
    BudgetLedgerRepository, CacheRepository, PaginatedResult, Pagination, SessionRepository,
    TenantRepository,
};
use uuid::Uuid;

use tollgate_core::period::period_start_of;

#[derive(Default)]
struct Tables {
    tenants: HashMap<Uuid, Tenant>,
    accounts: HashMap<Uuid, Account>,
    api_keys: HashMap<Uuid, ApiKey>,
    sessions: HashMap<Uuid, Session>,
    cache: HashMap<(Uuid, CacheKey), CacheEntry>,
    spend: Vec<SpendRecord>,
    alerts: Vec<BudgetAlert>,
    audit: Vec<AuditEvent>,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    /// Artificial delay in milliseconds for every operation, used to
    /// exercise deadline handling.
    latency_ms: AtomicU64,
    /// Extra delay for individual operations, keyed `"<table>.<method>"`.
    operation_latency_ms: DashMap<&'static str, u64>,
}

/// Shared in-memory store. Cloning yields another handle to the same
/// data, so one store can back every repository trait at once.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Delay only `operation` (for example `"ledger.commit_reservation"`)
    /// by `latency`. A zero latency clears the override.
    pub fn set_operation_latency(&self, operation: &'static str, latency: Duration) {
        let ms = latency.as_millis() as u64;
        if ms == 0 {
            self.inner.operation_latency_ms.remove(operation);
        } else {
            self.inner.operation_latency_ms.insert(operation, ms);
        }
    }

    async fn simulate_latency(&self, operation: &'static str) {
        let extra = self
            .inner
            .operation_latency_ms
            .get(operation)
            .map(|ms| *ms)
            .unwrap_or(0);
        let ms = self.inner.latency_ms.load(Ordering::Relaxed) + extra;
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn not_found(entity: &str, id: impl ToString) -> TollgateError {
    TollgateError::NotFound {
        entity: entity.into(),
        id: id.to_string(),
    }
}

fn paginate<T: Clone>(items: Vec<T>, pagination: &Pagination) -> PaginatedResult<T> {
    let total = items.len() as u64;
    let page = items
        .into_iter()
        .skip(pagination.offset as usize)
        .take(pagination.limit as usize)
        .collect();
    PaginatedResult {
        items: page,
        total,
        offset: pagination.offset,
        limit: pagination.limit,
    }
}

fn tenant_budget(tables: &Tables, tenant_id: Uuid) -> TollgateResult<BudgetState> {
    tables
        .tenants
        .get(&tenant_id)
        .map(Tenant::budget_state)
        .ok_or_else(|| not_found("tenant", tenant_id))
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

impl TenantRepository for MemoryStore {
    async fn create(&self, input: CreateTenant) -> TollgateResult<Tenant> {
        self.simulate_latency("tenant.create").await;
        let mut tables = self.inner.tables.write().await;
        if tables.tenants.values().any(|t| t.slug == input.slug) {
            return Err(TollgateError::AlreadyExists {
                entity: "tenant".into(),
            });
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: input.name,
            slug: input.slug,
            allowed_scopes: input.allowed_scopes,
            budget_limit: input.budget_limit,
            committed_spend: Money::ZERO,
            reserved_spend: Money::ZERO,
            period_start: period_start_of(now),
            status: TenantStatus::Active,
            alert_level: 0,
            created_at: now,
            updated_at: now,
        };
        tables.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_by_id(&self, id: Uuid) -> TollgateResult<Tenant> {
        self.simulate_latency("tenant.get_by_id").await;
        let tables = self.inner.tables.read().await;
        tables
            .tenants
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("tenant", id))
    }

    async fn get_by_slug(&self, slug: &str) -> TollgateResult<Tenant> {
        self.simulate_latency("tenant.get_by_slug").await;
        let tables = self.inner.tables.read().await;
        tables
            .tenants
            .values()
            .find(|t| t.slug == slug)
            .cloned()
            .ok_or_else(|| not_found("tenant", format!("slug={slug}")))
    }

    async fn update(&self, id: Uuid, input: UpdateTenant) -> TollgateResult<Tenant> {
        self.simulate_latency("tenant.update").await;
        let mut tables = self.inner.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&id)
            .ok_or_else(|| not_found("tenant", id))?;
        if let Some(name) = input.name {
            tenant.name = name;
        }
        if let Some(scopes) = input.allowed_scopes {
            tenant.allowed_scopes = scopes;
        }
        if let Some(limit) = input.budget_limit {
            tenant.budget_limit = limit;
        }
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn list(&self, pagination: Pagination) -> TollgateResult<PaginatedResult<Tenant>> {
        self.simulate_latency("tenant.list").await;
        let tables = self.inner.tables.read().await;
        let mut items: Vec<Tenant> = tables.tenants.values().cloned().collect();
        items.sort_by_key(|t| t.created_at);
        Ok(paginate(items, &pagination))
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

impl AccountRepository for MemoryStore {
    async fn create(&self, input: CreateAccount) -> TollgateResult<Account> {
        self.simulate_latency("account.create").await;
        let mut tables = self.inner.tables.write().await;
        let duplicate = tables.accounts.values().any(|a| {
            a.tenant_id == input.tenant_id
                && (a.username == input.username || a.email == input.email)
        });
        if duplicate {
            return Err(TollgateError::AlreadyExists {
                entity: "account".into(),
            });
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            username: input.username,
            email: input.email,
            credential_hash: input.credential_hash,
            kind: input.kind,
            status: AccountStatus::Active,
            scopes: input.scopes,
            failed_login_attempts: 0,
            lockout_count: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<Account> {
        self.simulate_latency("account.get_by_id").await;
        let tables = self.inner.tables.read().await;
        tables
            .accounts
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| not_found("account", id))
    }

    async fn get_by_username(&self, tenant_id: Uuid, username: &str) -> TollgateResult<Account> {
        self.simulate_latency("account.get_by_username").await;
        let tables = self.inner.tables.read().await;
        tables
            .accounts
            .values()
            .find(|a| a.tenant_id == tenant_id && a.username == username)
            .cloned()
            .ok_or_else(|| not_found("account", format!("username={username}")))
    }

    async fn get_by_email(&self, tenant_id: Uuid, email: &str) -> TollgateResult<Account> {
        self.simulate_latency("account.get_by_email").await;
        let tables = self.inner.tables.read().await;
        tables
            .accounts
            .values()
            .find(|a| a.tenant_id == tenant_id && a.email == email)
            .cloned()
            .ok_or_else(|| not_found("account", format!("email={email}")))
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateAccount,
    ) -> TollgateResult<Account> {
        self.simulate_latency("account.update").await;
        let mut tables = self.inner.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| not_found("account", id))?;
        if let Some(email) = input.email {
            account.email = email;
        }
        if let Some(hash) = input.credential_hash {
            account.credential_hash = hash;
        }
        if let Some(status) = input.status {
            account.status = status;
        }
        if let Some(scopes) = input.scopes {
            account.scopes = scopes;
        }
        if let Some(attempts) = input.failed_login_attempts {
            account.failed_login_attempts = attempts;
        }
        if let Some(count) = input.lockout_count {
            account.lockout_count = count;
        }
        if let Some(locked_until) = input.locked_until {
            account.locked_until = locked_until;
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn disable(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<()> {
        AccountRepository::update(
            self,
            tenant_id,
            id,
            UpdateAccount {
                status: Some(AccountStatus::Disabled),
                ..Default::default()
            },
        )
        .await
        .map(|_| ())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<Account>> {
        self.simulate_latency("account.list").await;
        let tables = self.inner.tables.read().await;
        let mut items: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by_key(|a| a.created_at);
        Ok(paginate(items, &pagination))
    }
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

impl ApiKeyRepository for MemoryStore {
    async fn create(&self, input: CreateApiKey) -> TollgateResult<ApiKey> {
        self.simulate_latency("api_key.create").await;
        let mut tables = self.inner.tables.write().await;
        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            account_id: input.account_id,
            name: input.name,
            prefix: input.prefix,
            key_hash: input.key_hash,
            scopes: input.scopes,
            revoked: false,
            created_at: Utc::now(),
            last_used_at: None,
        };
        tables.api_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_by_hash(&self, key_hash: &str) -> TollgateResult<ApiKey> {
        self.simulate_latency("api_key.get_by_hash").await;
        let tables = self.inner.tables.read().await;
        tables
            .api_keys
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned()
            .ok_or_else(|| not_found("api_key", "hash"))
    }

    async fn list_by_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> TollgateResult<Vec<ApiKey>> {
        self.simulate_latency("api_key.list_by_account").await;
        let tables = self.inner.tables.read().await;
        let mut keys: Vec<ApiKey> = tables
            .api_keys
            .values()
            .filter(|k| k.tenant_id == tenant_id && k.account_id == account_id)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }

    async fn revoke(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<()> {
        self.simulate_latency("api_key.revoke").await;
        let mut tables = self.inner.tables.write().await;
        let key = tables
            .api_keys
            .get_mut(&id)
            .filter(|k| k.tenant_id == tenant_id)
            .ok_or_else(|| not_found("api_key", id))?;
        key.revoked = true;
        Ok(())
    }

    async fn touch(&self, tenant_id: Uuid, id: Uuid, at: DateTime<Utc>) -> TollgateResult<()> {
        self.simulate_latency("api_key.touch").await;
        let mut tables = self.inner.tables.write().await;
        if let Some(key) = tables
            .api_keys
            .get_mut(&id)
            .filter(|k| k.tenant_id == tenant_id)
        {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

impl SessionRepository for MemoryStore {
    async fn create(&self, input: CreateSession) -> TollgateResult<Session> {
        self.simulate_latency("session.create").await;
        let mut tables = self.inner.tables.write().await;
        if tables.sessions.contains_key(&input.id) {
            return Err(TollgateError::AlreadyExists {
                entity: "session".into(),
            });
        }
        let now = Utc::now();
        let session = Session {
            id: input.id,
            tenant_id: input.tenant_id,
            account_id: input.account_id,
            scopes: input.scopes,
            refresh_token_id: input.refresh_token_id,
            origin: input.origin,
            created_at: now,
            last_activity_at: now,
            expires_at: input.expires_at,
            revoked: false,
            revoked_reason: None,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TollgateResult<Session> {
        self.simulate_latency("session.get_by_id").await;
        let tables = self.inner.tables.read().await;
        tables
            .sessions
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| not_found("session", id))
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> TollgateResult<Vec<Session>> {
        self.simulate_latency("session.list_active").await;
        let tables = self.inner.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| {
                s.tenant_id == tenant_id && s.account_id == account_id && s.is_active_at(now)
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.last_activity_at, s.created_at));
        Ok(sessions)
    }

    async fn rotate_refresh_token(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: RotateRefreshToken,
    ) -> TollgateResult<Option<Session>> {
        self.simulate_latency("session.rotate_refresh_token").await;
        let mut tables = self.inner.tables.write().await;
        let Some(session) = tables
            .sessions
            .get_mut(&id)
            .filter(|s| s.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if session.revoked || session.refresh_token_id != input.expected_token_id {
            return Ok(None);
        }
        session.refresh_token_id = input.new_token_id;
        session.origin = session.origin.merged_with(&input.origin);
        session.expires_at = input.expires_at;
        session.last_activity_at = input.now;
        Ok(Some(session.clone()))
    }

    async fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: RevocationReason,
    ) -> TollgateResult<bool> {
        self.simulate_latency("session.revoke").await;
        let mut tables = self.inner.tables.write().await;
        match tables
            .sessions
            .get_mut(&id)
            .filter(|s| s.tenant_id == tenant_id)
        {
            Some(session) if !session.revoked => {
                session.revoked = true;
                session.revoked_reason = Some(reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_account_sessions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        except: Option<Uuid>,
        reason: RevocationReason,
    ) -> TollgateResult<u64> {
        self.simulate_latency("session.revoke_account_sessions").await;
        let mut tables = self.inner.tables.write().await;
        let mut revoked = 0;
        for session in tables.sessions.values_mut() {
            if session.tenant_id == tenant_id
                && session.account_id == account_id
                && Some(session.id) != except
                && !session.revoked
            {
                session.revoked = true;
                session.revoked_reason = Some(reason);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn cleanup_expired(&self, tenant_id: Uuid, now: DateTime<Utc>) -> TollgateResult<u64> {
        self.simulate_latency("session.cleanup_expired").await;
        let mut tables = self.inner.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| !(s.tenant_id == tenant_id && s.expires_at < now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Response cache
// ---------------------------------------------------------------------------

impl CacheRepository for MemoryStore {
    async fn record_hit(
        &self,
        tenant_id: Uuid,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> TollgateResult<Option<CacheEntry>> {
        self.simulate_latency("cache.record_hit").await;
        let mut tables = self.inner.tables.write().await;
        match tables.cache.get_mut(&(tenant_id, key.clone())) {
            Some(entry) if entry.is_live_at(now) => {
                entry.hit_count += 1;
                entry.last_hit_at = Some(now);
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn upsert(&self, input: StoreCacheEntry) -> TollgateResult<CacheEntry> {
        self.simulate_latency("cache.upsert").await;
        let mut tables = self.inner.tables.write().await;
        let entry = CacheEntry {
            key: input.key.clone(),
            tenant_id: input.tenant_id,
            model: input.model,
            payload: input.payload,
            usage: input.usage,
            cost: input.cost,
            created_at: Utc::now(),
            expires_at: input.expires_at,
            hit_count: 0,
            last_hit_at: None,
        };
        tables
            .cache
            .insert((input.tenant_id, input.key), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, tenant_id: Uuid, key: &CacheKey) -> TollgateResult<bool> {
        self.simulate_latency("cache.delete").await;
        let mut tables = self.inner.tables.write().await;
        Ok(tables.cache.remove(&(tenant_id, key.clone())).is_some())
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> TollgateResult<u64> {
        self.simulate_latency("cache.delete_tenant").await;
        let mut tables = self.inner.tables.write().await;
        let before = tables.cache.len();
        tables.cache.retain(|(t, _), _| *t != tenant_id);
        Ok((before - tables.cache.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> TollgateResult<u64> {
        self.simulate_latency("cache.delete_expired").await;
        let mut tables = self.inner.tables.write().await;
        let before = tables.cache.len();
        tables.cache.retain(|_, e| e.is_live_at(now));
        Ok((before - tables.cache.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Budget ledger
// ---------------------------------------------------------------------------

impl BudgetLedgerRepository for MemoryStore {
    async fn get_state(&self, tenant_id: Uuid) -> TollgateResult<BudgetState> {
        self.simulate_latency("ledger.get_state").await;
        let tables = self.inner.tables.read().await;
        tenant_budget(&tables, tenant_id)
    }

    async fn try_reserve(
        &self,
        tenant_id: Uuid,
        amount: Money,
    ) -> TollgateResult<Option<BudgetState>> {
        self.simulate_latency("ledger.try_reserve").await;
        let mut tables = self.inner.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| not_found("tenant", tenant_id))?;
        let exposure = tenant.committed_spend + tenant.reserved_spend + amount;
        if tenant.status == TenantStatus::Suspended || exposure > tenant.budget_limit {
            return Ok(None);
        }
        tenant.reserved_spend += amount;
        tenant.updated_at = Utc::now();
        Ok(Some(tenant.budget_state()))
    }

    async fn settle(
        &self,
        tenant_id: Uuid,
        release: Money,
        commit: Money,
    ) -> TollgateResult<BudgetState> {
        self.simulate_latency("ledger.settle").await;
        let mut tables = self.inner.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| not_found("tenant", tenant_id))?;
        tenant.reserved_spend = (tenant.reserved_spend - release).non_negative();
        tenant.committed_spend += commit;
        tenant.updated_at = Utc::now();
        Ok(tenant.budget_state())
    }

    async fn set_status(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
        alert_level: u8,
    ) -> TollgateResult<BudgetState> {
        self.simulate_latency("ledger.set_status").await;
        let mut tables = self.inner.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| not_found("tenant", tenant_id))?;
        tenant.status = status;
        tenant.alert_level = alert_level;
        tenant.updated_at = Utc::now();
        Ok(tenant.budget_state())
    }

    async fn reset_period(
        &self,
        tenant_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> TollgateResult<BudgetState> {
        self.simulate_latency("ledger.reset_period").await;
        let mut tables = self.inner.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| not_found("tenant", tenant_id))?;
        tenant.committed_spend = Money::ZERO;
        tenant.period_start = period_start;
        tenant.status = TenantStatus::Active;
        tenant.alert_level = 0;
        tenant.updated_at = Utc::now();
        Ok(tenant.budget_state())
    }

    async fn append_spend(&self, input: CreateSpendRecord) -> TollgateResult<SpendRecord> {
        self.simulate_latency("ledger.append_spend").await;
        let mut tables = self.inner.tables.write().await;
        let record = SpendRecord {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            account_id: input.account_id,
            amount: input.amount,
            cache_served: input.cache_served,
            reservation_id: input.reservation_id,
            model: input.model,
            recorded_at: Utc::now(),
        };
        tables.spend.push(record.clone());
        Ok(record)
    }

    async fn commit_reservation(
        &self,
        input: CommitReservation,
    ) -> TollgateResult<Option<BudgetState>> {
        self.simulate_latency("ledger.commit_reservation").await;
        let mut tables = self.inner.tables.write().await;
        if tables.spend.iter().any(|r| r.id == input.reservation_id) {
            return Ok(None);
        }
        let tenant = tables
            .tenants
            .get_mut(&input.tenant_id)
            .ok_or_else(|| not_found("tenant", input.tenant_id))?;
        tenant.reserved_spend = (tenant.reserved_spend - input.estimated).non_negative();
        tenant.committed_spend += input.actual;
        tenant.updated_at = Utc::now();
        let state = tenant.budget_state();
        tables.spend.push(SpendRecord {
            id: input.reservation_id,
            tenant_id: input.tenant_id,
            account_id: input.account_id,
            amount: input.actual,
            cache_served: false,
            reservation_id: Some(input.reservation_id),
            model: input.model,
            recorded_at: Utc::now(),
        });
        Ok(Some(state))
    }

    async fn list_spend(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<SpendRecord>> {
        self.simulate_latency("ledger.list_spend").await;
        let tables = self.inner.tables.read().await;
        let items: Vec<SpendRecord> = tables
            .spend
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.recorded_at >= since)
            .cloned()
            .collect();
        Ok(paginate(items, &pagination))
    }

    async fn append_alert(&self, input: CreateBudgetAlert) -> TollgateResult<BudgetAlert> {
        self.simulate_latency("ledger.append_alert").await;
        let mut tables = self.inner.tables.write().await;
        let alert = BudgetAlert {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            threshold_pct: input.threshold_pct,
            spend_at_alert: input.spend_at_alert,
            limit: input.limit,
            acknowledged: false,
            created_at: Utc::now(),
        };
        tables.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<BudgetAlert>> {
        self.simulate_latency("ledger.list_alerts").await;
        let tables = self.inner.tables.read().await;
        let items: Vec<BudgetAlert> = tables
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        Ok(paginate(items, &pagination))
    }

    async fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> TollgateResult<BudgetAlert> {
        self.simulate_latency("ledger.acknowledge_alert").await;
        let mut tables = self.inner.tables.write().await;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.tenant_id == tenant_id)
            .ok_or_else(|| not_found("budget_alert", alert_id))?;
        alert.acknowledged = true;
        Ok(alert.clone())
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

impl AuditLogRepository for MemoryStore {
    async fn append(&self, input: CreateAuditEvent) -> TollgateResult<AuditEvent> {
        self.simulate_latency("audit.append").await;
        let mut tables = self.inner.tables.write().await;
        let event = AuditEvent {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            actor_id: input.actor_id,
            session_id: input.session_id,
            kind: input.kind,
            origin: input.origin,
            metadata: input.metadata,
            timestamp: Utc::now(),
        };
        tables.audit.push(event.clone());
        Ok(event)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: AuditEventFilter,
        pagination: Pagination,
    ) -> TollgateResult<PaginatedResult<AuditEvent>> {
        self.simulate_latency("audit.list").await;
        let tables = self.inner.tables.read().await;
        let items: Vec<AuditEvent> = tables
            .audit
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| filter.actor_id.is_none_or(|a| e.actor_id == Some(a)))
            .filter(|e| filter.kind.is_none_or(|k| e.kind == k))
            .filter(|e| filter.from.is_none_or(|from| e.timestamp >= from))
            .filter(|e| filter.to.is_none_or(|to| e.timestamp <= to))
            .cloned()
            .collect();
        Ok(paginate(items, &pagination))
    }
}
