//! Batch date helpers. Expiry is evaluated against a posting date, never the wall clock.

use chrono::NaiveDate;

/// A batch is expired once the posting date is past its expiry date.
pub fn is_expired(expiry: Option<NaiveDate>, on: NaiveDate) -> bool {
    expiry.map(|expiry| on > expiry).unwrap_or(false)
}

pub fn days_to_expiry(expiry: Option<NaiveDate>, on: NaiveDate) -> Option<i64> {
    expiry.map(|expiry| (expiry - on).num_days())
}

/// Manufacturing must strictly precede expiry when both are known.
pub fn dates_are_ordered(manufacturing: Option<NaiveDate>, expiry: Option<NaiveDate>) -> bool {
    match (manufacturing, expiry) {
        (Some(manufacturing), Some(expiry)) => manufacturing < expiry,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn expiry_is_inclusive_of_the_expiry_day() {
        let expiry = Some(date(2024, 6, 30));
        assert!(!is_expired(expiry, date(2024, 6, 30)));
        assert!(is_expired(expiry, date(2024, 7, 1)));
        assert!(!is_expired(None, date(2099, 1, 1)));
    }

    #[test]
    fn days_to_expiry_counts_down() {
        assert_eq!(days_to_expiry(Some(date(2024, 1, 11)), date(2024, 1, 1)), Some(10));
        assert_eq!(days_to_expiry(Some(date(2024, 1, 1)), date(2024, 1, 3)), Some(-2));
        assert_eq!(days_to_expiry(None, date(2024, 1, 1)), None);
    }

    #[test]
    fn manufacturing_must_precede_expiry() {
        assert!(dates_are_ordered(Some(date(2024, 1, 1)), Some(date(2025, 1, 1))));
        assert!(!dates_are_ordered(Some(date(2025, 1, 1)), Some(date(2025, 1, 1))));
        assert!(dates_are_ordered(None, Some(date(2025, 1, 1))));
    }
}
