//! Storage backend selection.
//!
//! A [`Backend`] names one concrete repository type per storage concern so
//! the rest of the server stays generic over SurrealDB and the in-memory
//! store.

use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tollgate_core::repository::{
    AccountRepository, ApiKeyRepository, AuditLogRepository, BudgetLedgerRepository,
    CacheRepository, SessionRepository, TenantRepository,
};
use tollgate_db::MemoryStore;
use tollgate_db::repository::{
    SurrealAccountRepository, SurrealApiKeyRepository, SurrealAuditLogRepository,
    SurrealBudgetLedgerRepository, SurrealCacheRepository, SurrealSessionRepository,
    SurrealTenantRepository,
};

pub trait Backend: Send + Sync + 'static {
    type Tenants: TenantRepository + 'static;
    type Accounts: AccountRepository + Clone + 'static;
    type ApiKeys: ApiKeyRepository + 'static;
    type Sessions: SessionRepository + 'static;
    type Cache: CacheRepository + 'static;
    type Ledger: BudgetLedgerRepository + 'static;
    type Audit: AuditLogRepository + Clone + 'static;
}

/// One handle per repository of a backend.
pub struct Repositories<B: Backend> {
    pub tenants: B::Tenants,
    pub accounts: B::Accounts,
    pub api_keys: B::ApiKeys,
    pub sessions: B::Sessions,
    pub cache: B::Cache,
    pub ledger: B::Ledger,
    pub audit: B::Audit,
}

/// Every repository backed by one shared [`MemoryStore`].
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    type Tenants = MemoryStore;
    type Accounts = MemoryStore;
    type ApiKeys = MemoryStore;
    type Sessions = MemoryStore;
    type Cache = MemoryStore;
    type Ledger = MemoryStore;
    type Audit = MemoryStore;
}

impl Repositories<MemoryBackend> {
    pub fn memory(store: MemoryStore) -> Self {
        Self {
            tenants: store.clone(),
            accounts: store.clone(),
            api_keys: store.clone(),
            sessions: store.clone(),
            cache: store.clone(),
            ledger: store.clone(),
            audit: store,
        }
    }
}

/// SurrealDB through whichever engine the endpoint selects.
pub struct SurrealBackend;

impl Backend for SurrealBackend {
    type Tenants = SurrealTenantRepository<Any>;
    type Accounts = SurrealAccountRepository<Any>;
    type ApiKeys = SurrealApiKeyRepository<Any>;
    type Sessions = SurrealSessionRepository<Any>;
    type Cache = SurrealCacheRepository<Any>;
    type Ledger = SurrealBudgetLedgerRepository<Any>;
    type Audit = SurrealAuditLogRepository<Any>;
}

impl Repositories<SurrealBackend> {
    pub fn surreal(db: &Surreal<Any>) -> Self {
        Self {
            tenants: SurrealTenantRepository::new(db.clone()),
            accounts: SurrealAccountRepository::new(db.clone()),
            api_keys: SurrealApiKeyRepository::new(db.clone()),
            sessions: SurrealSessionRepository::new(db.clone()),
            cache: SurrealCacheRepository::new(db.clone()),
            ledger: SurrealBudgetLedgerRepository::new(db.clone()),
            audit: SurrealAuditLogRepository::new(db.clone()),
        }
    }
}
