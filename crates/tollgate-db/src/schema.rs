//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings, money as
//! integer micro-units, enums as strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants (global scope) with the running budget ledger
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD allowed_scopes ON TABLE tenant TYPE array DEFAULT [];
DEFINE FIELD allowed_scopes.* ON TABLE tenant TYPE string;
DEFINE FIELD budget_limit ON TABLE tenant TYPE int;
DEFINE FIELD committed_spend ON TABLE tenant TYPE int DEFAULT 0;
DEFINE FIELD reserved_spend ON TABLE tenant TYPE int DEFAULT 0;
DEFINE FIELD period_start ON TABLE tenant TYPE datetime;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['Active', 'Warned', 'Suspended'];
DEFINE FIELD alert_level ON TABLE tenant TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;

-- =======================================================================
-- Accounts (tenant scope)
-- =======================================================================
DEFINE TABLE account SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE account TYPE string;
DEFINE FIELD username ON TABLE account TYPE string;
DEFINE FIELD email ON TABLE account TYPE string;
DEFINE FIELD credential_hash ON TABLE account TYPE string;
DEFINE FIELD kind ON TABLE account TYPE string \
    ASSERT $value IN ['Human', 'Service'];
DEFINE FIELD status ON TABLE account TYPE string \
    ASSERT $value IN ['Active', 'Locked', 'Disabled'];
DEFINE FIELD scopes ON TABLE account TYPE array DEFAULT [];
DEFINE FIELD scopes.* ON TABLE account TYPE string;
DEFINE FIELD failed_login_attempts ON TABLE account TYPE int DEFAULT 0;
DEFINE FIELD lockout_count ON TABLE account TYPE int DEFAULT 0;
DEFINE FIELD locked_until ON TABLE account TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_tenant_username ON TABLE account \
    COLUMNS tenant_id, username UNIQUE;
DEFINE INDEX idx_account_tenant_email ON TABLE account \
    COLUMNS tenant_id, email UNIQUE;

-- =======================================================================
-- API keys (tenant scope, looked up globally by hash)
-- =======================================================================
DEFINE TABLE api_key SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE api_key TYPE string;
DEFINE FIELD account_id ON TABLE api_key TYPE string;
DEFINE FIELD name ON TABLE api_key TYPE string;
DEFINE FIELD prefix ON TABLE api_key TYPE string;
DEFINE FIELD key_hash ON TABLE api_key TYPE string;
DEFINE FIELD scopes ON TABLE api_key TYPE array DEFAULT [];
DEFINE FIELD scopes.* ON TABLE api_key TYPE string;
DEFINE FIELD revoked ON TABLE api_key TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE api_key TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD last_used_at ON TABLE api_key TYPE option<datetime>;
DEFINE INDEX idx_api_key_hash ON TABLE api_key COLUMNS key_hash UNIQUE;
DEFINE INDEX idx_api_key_account ON TABLE api_key \
    COLUMNS tenant_id, account_id;

-- =======================================================================
-- Sessions (tenant scope)
-- =======================================================================
DEFINE TABLE session SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE session TYPE string;
DEFINE FIELD account_id ON TABLE session TYPE string;
DEFINE FIELD scopes ON TABLE session TYPE array DEFAULT [];
DEFINE FIELD scopes.* ON TABLE session TYPE string;
DEFINE FIELD refresh_token_id ON TABLE session TYPE string;
DEFINE FIELD ip_address ON TABLE session TYPE option<string>;
DEFINE FIELD user_agent ON TABLE session TYPE option<string>;
DEFINE FIELD created_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD last_activity_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE session TYPE datetime;
DEFINE FIELD revoked ON TABLE session TYPE bool DEFAULT false;
DEFINE FIELD revoked_reason ON TABLE session TYPE option<string>;
DEFINE INDEX idx_session_account ON TABLE session \
    COLUMNS tenant_id, account_id;

-- =======================================================================
-- Response cache (tenant scope)
-- =======================================================================
DEFINE TABLE cache_entry SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE cache_entry TYPE string;
DEFINE FIELD cache_key ON TABLE cache_entry TYPE string;
DEFINE FIELD model ON TABLE cache_entry TYPE string;
DEFINE FIELD payload ON TABLE cache_entry TYPE any;
DEFINE FIELD prompt_tokens ON TABLE cache_entry TYPE int;
DEFINE FIELD completion_tokens ON TABLE cache_entry TYPE int;
DEFINE FIELD cost ON TABLE cache_entry TYPE int;
DEFINE FIELD created_at ON TABLE cache_entry TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE cache_entry TYPE datetime;
DEFINE FIELD hit_count ON TABLE cache_entry TYPE int DEFAULT 0;
DEFINE FIELD last_hit_at ON TABLE cache_entry TYPE option<datetime>;
DEFINE INDEX idx_cache_expiry ON TABLE cache_entry COLUMNS expires_at;

-- =======================================================================
-- Spend ledger (tenant scope, append-only)
-- =======================================================================
DEFINE TABLE spend_record SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD tenant_id ON TABLE spend_record TYPE string;
DEFINE FIELD account_id ON TABLE spend_record TYPE string;
DEFINE FIELD amount ON TABLE spend_record TYPE int;
DEFINE FIELD cache_served ON TABLE spend_record TYPE bool;
DEFINE FIELD reservation_id ON TABLE spend_record TYPE option<string>;
DEFINE FIELD model ON TABLE spend_record TYPE option<string>;
DEFINE FIELD recorded_at ON TABLE spend_record TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_spend_tenant_time ON TABLE spend_record \
    COLUMNS tenant_id, recorded_at;

-- =======================================================================
-- Budget alerts (tenant scope)
-- =======================================================================
DEFINE TABLE budget_alert SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE budget_alert TYPE string;
DEFINE FIELD threshold_pct ON TABLE budget_alert TYPE int;
DEFINE FIELD spend_at_alert ON TABLE budget_alert TYPE int;
DEFINE FIELD limit_amount ON TABLE budget_alert TYPE int;
DEFINE FIELD acknowledged ON TABLE budget_alert TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE budget_alert TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_budget_alert_tenant ON TABLE budget_alert \
    COLUMNS tenant_id, created_at;

-- =======================================================================
-- Security audit log (tenant scope, append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD tenant_id ON TABLE audit_event TYPE string;
DEFINE FIELD actor_id ON TABLE audit_event TYPE option<string>;
DEFINE FIELD session_id ON TABLE audit_event TYPE option<string>;
DEFINE FIELD kind ON TABLE audit_event TYPE string;
DEFINE FIELD ip_address ON TABLE audit_event TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_event TYPE option<string>;
DEFINE FIELD metadata ON TABLE audit_event TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_tenant_time ON TABLE audit_event \
    COLUMNS tenant_id, timestamp;
DEFINE INDEX idx_audit_tenant_actor ON TABLE audit_event \
    COLUMNS tenant_id, actor_id;
";

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates the `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the recorded maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Raw DDL for schema version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
