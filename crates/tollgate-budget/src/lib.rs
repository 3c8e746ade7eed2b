//! Tollgate Budget — per-tenant spend governance.
//!
//! Paid operations reserve their worst-case cost before running, then
//! commit the metered cost or release the hold. Exposure (committed plus
//! reserved) drives a small per-tenant state machine that raises alerts
//! at soft thresholds and suspends the tenant at the hard limit.

pub mod config;
pub mod governor;
pub mod thresholds;

pub use config::BudgetConfig;
pub use governor::{BudgetGovernor, BudgetSnapshot};
pub use thresholds::{Evaluation, evaluate};
