use crate::limits::DAY_MS;
use crate::model::DateRange;

/// Whole days billed for a range; any started day counts in full.
pub fn billable_days(range: &DateRange) -> i64 {
    (range.duration_ms() + DAY_MS - 1) / DAY_MS
}

pub fn total_price(range: &DateRange, daily_price: f64) -> f64 {
    billable_days(range) as f64 * daily_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_instant;

    const H: i64 = 3_600_000;

    #[test]
    fn two_calendar_days() {
        let range = DateRange::new(
            parse_instant("2024-01-01").unwrap(),
            parse_instant("2024-01-03").unwrap(),
        );
        assert_eq!(billable_days(&range), 2);
        assert_eq!(total_price(&range, 50.0), 100.0);
    }

    #[test]
    fn partial_day_rounds_up() {
        let range = DateRange::new(0, 36 * H);
        assert_eq!(billable_days(&range), 2);
        assert_eq!(total_price(&range, 50.0), 100.0);
    }

    #[test]
    fn one_ms_over_a_day() {
        assert_eq!(billable_days(&DateRange::new(0, DAY_MS + 1)), 2);
        assert_eq!(billable_days(&DateRange::new(0, DAY_MS)), 1);
        assert_eq!(billable_days(&DateRange::new(0, 1)), 1);
    }

    #[test]
    fn fractional_rate() {
        let range = DateRange::new(0, 3 * DAY_MS);
        assert!((total_price(&range, 19.99) - 59.97).abs() < 1e-9);
    }
}
