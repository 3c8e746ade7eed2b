//! SurrealDB repository implementations.

mod account;
mod api_key;
mod audit;
mod cache;
mod ledger;
mod session;
mod tenant;

pub use account::SurrealAccountRepository;
pub use api_key::SurrealApiKeyRepository;
pub use audit::SurrealAuditLogRepository;
pub use cache::SurrealCacheRepository;
pub use ledger::SurrealBudgetLedgerRepository;
pub use session::SurrealSessionRepository;
pub use tenant::SurrealTenantRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for `count()` queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(table: &'static str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::corrupt(table, format!("invalid UUID {raw}: {e}")))
}

fn parse_opt_uuid(table: &'static str, raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| parse_uuid(table, &s)).transpose()
}

fn count_from(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}
