//! Calendar-month billing periods (UTC).

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Start of the billing period containing `at`: midnight UTC on the first
/// day of its month.
pub fn period_start_of(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

/// Start of the period following the one that began at `period_start`.
pub fn next_period_start(period_start: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = match period_start.month() {
        12 => (period_start.year() + 1, 1),
        m => (period_start.year(), m + 1),
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(period_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_of_month() {
        let at = Utc.with_ymd_and_hms(2026, 3, 17, 13, 45, 2).unwrap();
        assert_eq!(
            period_start_of(at),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_period_wraps_year() {
        let dec = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(
            next_period_start(dec),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
