//! Budget ledger models: running state, reservations, spend records and
//! threshold alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tenant::TenantStatus;
use crate::money::Money;

/// A tenant's running budget for the current billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub tenant_id: Uuid,
    pub limit: Money,
    pub committed: Money,
    pub reserved: Money,
    pub period_start: DateTime<Utc>,
    pub status: TenantStatus,
    pub alert_level: u8,
}

impl BudgetState {
    /// Committed spend plus outstanding reservations.
    pub fn exposure(&self) -> Money {
        self.committed + self.reserved
    }

    pub fn remaining(&self) -> Money {
        (self.limit - self.exposure()).non_negative()
    }

    pub fn utilization_pct(&self) -> f64 {
        self.exposure().percent_of(self.limit)
    }
}

/// A provisional hold on budget made before an irreversible paid call.
///
/// Must be settled exactly once with `commit_spend` or `release_spend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub estimated: Money,
    pub period_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger row for one billed (or cache-served) operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub amount: Money,
    pub cache_served: bool,
    pub reservation_id: Option<Uuid>,
    pub model: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSpendRecord {
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub amount: Money,
    pub cache_served: bool,
    pub reservation_id: Option<Uuid>,
    pub model: Option<String>,
}

/// Settles a reservation and records its spend in one step. The
/// reservation id doubles as the spend record's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReservation {
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub reservation_id: Uuid,
    /// Released from the reserved total.
    pub estimated: Money,
    /// Added to committed spend and recorded.
    pub actual: Money,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Threshold crossed, in percent of the limit.
    pub threshold_pct: u8,
    pub spend_at_alert: Money,
    pub limit: Money,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBudgetAlert {
    pub tenant_id: Uuid,
    pub threshold_pct: u8,
    pub spend_at_alert: Money,
    pub limit: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(limit: i64, committed: i64, reserved: i64) -> BudgetState {
        BudgetState {
            tenant_id: Uuid::new_v4(),
            limit: Money::from_units(limit),
            committed: Money::from_units(committed),
            reserved: Money::from_units(reserved),
            period_start: Utc::now(),
            status: TenantStatus::Active,
            alert_level: 0,
        }
    }

    #[test]
    fn exposure_includes_reservations() {
        let s = state(100, 60, 15);
        assert_eq!(s.exposure(), Money::from_units(75));
        assert_eq!(s.remaining(), Money::from_units(25));
        assert_eq!(s.utilization_pct(), 75.0);
    }

    #[test]
    fn remaining_never_negative() {
        assert_eq!(state(100, 120, 0).remaining(), Money::ZERO);
    }
}
