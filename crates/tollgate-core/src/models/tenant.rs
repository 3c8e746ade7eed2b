//! Tenant domain model.
//!
//! A tenant is the isolation boundary for one customer organization. It
//! owns accounts, sessions, cache entries and a running budget ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::budget::BudgetState;
use crate::money::Money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    /// A soft spend threshold was crossed; still fully functional.
    Warned,
    /// Hard limit reached; paid operations are refused.
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// URL-safe unique identifier (e.g., `acme-corp`).
    pub slug: String,
    /// Upper bound on the scopes any account in this tenant may hold.
    pub allowed_scopes: Vec<String>,
    pub budget_limit: Money,
    /// Spend committed in the current billing period.
    pub committed_spend: Money,
    /// Outstanding reservations not yet committed or released.
    pub reserved_spend: Money,
    pub period_start: DateTime<Utc>,
    pub status: TenantStatus,
    /// Highest alert threshold (percent) raised this period.
    pub alert_level: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn budget_state(&self) -> BudgetState {
        BudgetState {
            tenant_id: self.id,
            limit: self.budget_limit,
            committed: self.committed_spend,
            reserved: self.reserved_spend,
            period_start: self.period_start,
            status: self.status,
            alert_level: self.alert_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub allowed_scopes: Vec<String>,
    pub budget_limit: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub allowed_scopes: Option<Vec<String>>,
    pub budget_limit: Option<Money>,
}
