//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories
//! require a `tenant_id` parameter to enforce data isolation; no
//! repository consults ambient "current tenant" state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TollgateResult;
use crate::models::{
    account::{Account, CreateAccount, UpdateAccount},
    api_key::{ApiKey, CreateApiKey},
    audit::{AuditEvent, AuditEventKind, CreateAuditEvent},
    budget::{
        BudgetAlert, BudgetState, CommitReservation, CreateBudgetAlert, CreateSpendRecord,
        SpendRecord,
    },
    cache_entry::{CacheEntry, CacheKey, StoreCacheEntry},
    session::{CreateSession, RevocationReason, RotateRefreshToken, Session},
    tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant},
};
use crate::money::Money;

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Tenant directory (global scope)
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = TollgateResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TollgateResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = TollgateResult<Tenant>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = TollgateResult<Tenant>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = TollgateResult<PaginatedResult<Tenant>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-scoped repositories
// ---------------------------------------------------------------------------

pub trait AccountRepository: Send + Sync {
    fn create(&self, input: CreateAccount)
    -> impl Future<Output = TollgateResult<Account>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TollgateResult<Account>> + Send;
    fn get_by_username(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> impl Future<Output = TollgateResult<Account>> + Send;
    fn get_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> impl Future<Output = TollgateResult<Account>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateAccount,
    ) -> impl Future<Output = TollgateResult<Account>> + Send;
    /// Soft-delete: sets status to Disabled.
    fn disable(&self, tenant_id: Uuid, id: Uuid)
    -> impl Future<Output = TollgateResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TollgateResult<PaginatedResult<Account>>> + Send;
}

pub trait ApiKeyRepository: Send + Sync {
    fn create(&self, input: CreateApiKey) -> impl Future<Output = TollgateResult<ApiKey>> + Send;
    /// Look up a key by its hash. Not tenant-scoped: the key itself
    /// determines the tenant.
    fn get_by_hash(&self, key_hash: &str) -> impl Future<Output = TollgateResult<ApiKey>> + Send;
    fn list_by_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> impl Future<Output = TollgateResult<Vec<ApiKey>>> + Send;
    fn revoke(&self, tenant_id: Uuid, id: Uuid) -> impl Future<Output = TollgateResult<()>> + Send;
    fn touch(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<()>> + Send;
}

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession)
    -> impl Future<Output = TollgateResult<Session>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TollgateResult<Session>> + Send;
    /// Non-revoked, unexpired sessions of an account, least recently
    /// active first.
    fn list_active(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<Vec<Session>>> + Send;
    /// Atomically replace the refresh-token id if it still equals
    /// `input.expected_token_id` and the session is not revoked.
    ///
    /// Returns `Ok(None)` when the swap did not happen; exactly one of
    /// several concurrent callers with the same expected id succeeds.
    fn rotate_refresh_token(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: RotateRefreshToken,
    ) -> impl Future<Output = TollgateResult<Option<Session>>> + Send;
    /// Revoke one session. Returns `true` if it was active before.
    fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: RevocationReason,
    ) -> impl Future<Output = TollgateResult<bool>> + Send;
    /// Revoke every session of an account except `except`. Returns the
    /// number of sessions revoked.
    fn revoke_account_sessions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        except: Option<Uuid>,
        reason: RevocationReason,
    ) -> impl Future<Output = TollgateResult<u64>> + Send;
    /// Remove sessions that expired before `now`.
    fn cleanup_expired(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<u64>> + Send;
}

pub trait CacheRepository: Send + Sync {
    /// If a live entry exists for `key` in this tenant, atomically bump
    /// its hit counter and last-hit time and return the updated entry.
    fn record_hit(
        &self,
        tenant_id: Uuid,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<Option<CacheEntry>>> + Send;
    /// Insert or overwrite (last writer wins).
    fn upsert(
        &self,
        input: StoreCacheEntry,
    ) -> impl Future<Output = TollgateResult<CacheEntry>> + Send;
    fn delete(
        &self,
        tenant_id: Uuid,
        key: &CacheKey,
    ) -> impl Future<Output = TollgateResult<bool>> + Send;
    fn delete_tenant(&self, tenant_id: Uuid) -> impl Future<Output = TollgateResult<u64>> + Send;
    fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<u64>> + Send;
}

/// Per-tenant running budget plus the append-only spend and alert
/// ledgers.
pub trait BudgetLedgerRepository: Send + Sync {
    fn get_state(&self, tenant_id: Uuid)
    -> impl Future<Output = TollgateResult<BudgetState>> + Send;
    /// Atomic check-and-increment: adds `amount` to the reserved total
    /// only if the tenant is not suspended and
    /// `committed + reserved + amount <= limit`. Returns `Ok(None)` when
    /// the check fails.
    fn try_reserve(
        &self,
        tenant_id: Uuid,
        amount: Money,
    ) -> impl Future<Output = TollgateResult<Option<BudgetState>>> + Send;
    /// Unconditionally subtract `release` from the reserved total and add
    /// `commit` to the committed total.
    fn settle(
        &self,
        tenant_id: Uuid,
        release: Money,
        commit: Money,
    ) -> impl Future<Output = TollgateResult<BudgetState>> + Send;
    fn set_status(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
        alert_level: u8,
    ) -> impl Future<Output = TollgateResult<BudgetState>> + Send;
    /// Start a new billing period: committed spend and alert level reset,
    /// status returns to Active. Outstanding reservations carry over.
    fn reset_period(
        &self,
        tenant_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> impl Future<Output = TollgateResult<BudgetState>> + Send;
    fn append_spend(
        &self,
        input: CreateSpendRecord,
    ) -> impl Future<Output = TollgateResult<SpendRecord>> + Send;
    /// Release a reservation, add its metered cost to committed spend and
    /// append the spend record, atomically. Keyed by the reservation id:
    /// if it was already committed nothing changes and `Ok(None)` is
    /// returned.
    fn commit_reservation(
        &self,
        input: CommitReservation,
    ) -> impl Future<Output = TollgateResult<Option<BudgetState>>> + Send;
    fn list_spend(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
        pagination: Pagination,
    ) -> impl Future<Output = TollgateResult<PaginatedResult<SpendRecord>>> + Send;
    fn append_alert(
        &self,
        input: CreateBudgetAlert,
    ) -> impl Future<Output = TollgateResult<BudgetAlert>> + Send;
    fn list_alerts(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TollgateResult<PaginatedResult<BudgetAlert>>> + Send;
    fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> impl Future<Output = TollgateResult<BudgetAlert>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (tenant-scoped, append-only)
// ---------------------------------------------------------------------------

/// Filter criteria for audit event queries.
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    pub actor_id: Option<Uuid>,
    pub kind: Option<AuditEventKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit event. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEvent,
    ) -> impl Future<Output = TollgateResult<AuditEvent>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        filter: AuditEventFilter,
        pagination: Pagination,
    ) -> impl Future<Output = TollgateResult<PaginatedResult<AuditEvent>>> + Send;
}
