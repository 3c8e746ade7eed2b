//! Budget governor configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Soft alert thresholds in percent of the limit, ascending
    /// (default: 75, 90). Reaching 100 % always suspends.
    pub soft_thresholds: Vec<u8>,
    /// Where tenant administrators request a budget increase; returned
    /// with every denial.
    pub admin_contact: String,
    /// Deadline for each ledger call. Reservations that time out fail
    /// closed.
    pub store_timeout_ms: u64,
}

impl BudgetConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            soft_thresholds: vec![75, 90],
            admin_contact: "billing-admin@tollgate.local".into(),
            store_timeout_ms: 2000,
        }
    }
}
