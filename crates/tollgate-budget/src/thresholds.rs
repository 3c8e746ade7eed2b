//! Threshold evaluation for the `active -> warned -> suspended` state
//! machine.
//!
//! Pure functions over a [`BudgetState`]; the governor persists whatever
//! they decide.

use tollgate_core::models::budget::BudgetState;
use tollgate_core::models::tenant::TenantStatus;
use tollgate_core::money::Money;

/// Threshold at which a tenant is suspended.
pub const HARD_LIMIT_PCT: u8 = 100;

/// Outcome of evaluating a tenant's exposure against its thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: TenantStatus,
    pub alert_level: u8,
    /// Thresholds newly crossed, ascending. Each is alerted once per
    /// period.
    pub raised: Vec<u8>,
}

impl Evaluation {
    /// Whether this evaluation moves the tenant into suspension.
    pub fn suspends(&self, previous: TenantStatus) -> bool {
        self.status == TenantStatus::Suspended && previous != TenantStatus::Suspended
    }

    pub fn changes(&self, state: &BudgetState) -> bool {
        self.status != state.status || self.alert_level != state.alert_level
    }
}

/// `true` once `amount` is at least `pct` percent of `limit`. Exact
/// integer arithmetic; a zero limit is reached by any amount.
pub fn reaches(amount: Money, limit: Money, pct: u8) -> bool {
    i128::from(amount.micros()) * 100 >= i128::from(limit.micros()) * i128::from(pct)
}

/// Evaluate exposure against `soft` thresholds and the hard limit.
///
/// Status never moves backwards here: a warned tenant whose exposure
/// drops stays warned until the period rolls over or an administrator
/// reactivates it.
pub fn evaluate(state: &BudgetState, soft: &[u8]) -> Evaluation {
    let exposure = state.exposure();
    let mut raised: Vec<u8> = soft
        .iter()
        .copied()
        .filter(|&pct| pct < HARD_LIMIT_PCT && pct > state.alert_level)
        .filter(|&pct| reaches(exposure, state.limit, pct))
        .collect();
    raised.sort_unstable();
    raised.dedup();

    let at_limit = reaches(exposure, state.limit, HARD_LIMIT_PCT);
    if at_limit && state.alert_level < HARD_LIMIT_PCT {
        raised.push(HARD_LIMIT_PCT);
    }

    let alert_level = raised.last().copied().unwrap_or(0).max(state.alert_level);
    let status = if at_limit || state.status == TenantStatus::Suspended {
        TenantStatus::Suspended
    } else if !raised.is_empty() || state.status == TenantStatus::Warned {
        TenantStatus::Warned
    } else {
        state.status
    };

    Evaluation {
        status,
        alert_level,
        raised,
    }
}

/// Highest soft threshold reached by the current exposure, used when an
/// administrator lifts a suspension.
pub fn soft_level(state: &BudgetState, soft: &[u8]) -> u8 {
    soft.iter()
        .copied()
        .filter(|&pct| pct < HARD_LIMIT_PCT && reaches(state.exposure(), state.limit, pct))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    const SOFT: &[u8] = &[75, 90];

    fn state(committed: i64, reserved: i64, alert_level: u8, status: TenantStatus) -> BudgetState {
        BudgetState {
            tenant_id: Uuid::new_v4(),
            limit: Money::from_units(100),
            committed: Money::from_units(committed),
            reserved: Money::from_units(reserved),
            period_start: Utc::now(),
            status,
            alert_level,
        }
    }

    #[test]
    fn below_thresholds_is_quiet() {
        let eval = evaluate(&state(50, 20, 0, TenantStatus::Active), SOFT);
        assert_eq!(eval.status, TenantStatus::Active);
        assert!(eval.raised.is_empty());
        assert_eq!(eval.alert_level, 0);
    }

    #[test]
    fn reservations_count_towards_thresholds() {
        let eval = evaluate(&state(50, 25, 0, TenantStatus::Active), SOFT);
        assert_eq!(eval.status, TenantStatus::Warned);
        assert_eq!(eval.raised, vec![75]);
        assert_eq!(eval.alert_level, 75);
    }

    #[test]
    fn thresholds_alert_once_per_period() {
        let eval = evaluate(&state(80, 0, 75, TenantStatus::Warned), SOFT);
        assert!(eval.raised.is_empty());
        assert!(!eval.changes(&state(80, 0, 75, TenantStatus::Warned)));

        let eval = evaluate(&state(91, 0, 75, TenantStatus::Warned), SOFT);
        assert_eq!(eval.raised, vec![90]);
    }

    #[test]
    fn landing_on_the_limit_suspends_and_raises_skipped_levels() {
        let before = state(60, 40, 0, TenantStatus::Active);
        let eval = evaluate(&before, SOFT);
        assert_eq!(eval.status, TenantStatus::Suspended);
        assert_eq!(eval.raised, vec![75, 90, 100]);
        assert!(eval.suspends(before.status));
    }

    #[test]
    fn suspension_is_sticky() {
        let eval = evaluate(&state(10, 0, 100, TenantStatus::Suspended), SOFT);
        assert_eq!(eval.status, TenantStatus::Suspended);
        assert!(eval.raised.is_empty());
        assert!(!eval.suspends(TenantStatus::Suspended));
    }

    #[test]
    fn exact_integer_comparison() {
        let limit = Money::from_units(3);
        assert!(reaches(Money::from_micros(2_250_000), limit, 75));
        assert!(!reaches(Money::from_micros(2_249_999), limit, 75));
        assert!(reaches(Money::ZERO, Money::ZERO, 100));
    }

    #[test]
    fn soft_level_ignores_hard_limit() {
        assert_eq!(soft_level(&state(120, 0, 100, TenantStatus::Suspended), SOFT), 90);
        assert_eq!(soft_level(&state(10, 0, 100, TenantStatus::Suspended), SOFT), 0);
    }
}
