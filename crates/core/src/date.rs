//! `YYYYMMDD` date handling
//!
//! Dates travel through the API as `YYYYMMDD` strings and are stored in the
//! indexes as day numbers (days since 0001-01-01, proleptic Gregorian), so
//! "add N days" is integer addition and range checks are integer compares.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate};

/// Day number: days since 0001-01-01 (day 1 is 0001-01-01).
pub type Day = i32;

const DATE_FORMAT: &str = "%Y%m%d";

/// Parse a `YYYYMMDD` date into a day number.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` if the string is not a valid calendar date.
pub fn parse_day(date: &str) -> Result<Day> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_argument(format!(
            "invalid date '{}', expected YYYYMMDD",
            date
        )));
    }
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map(|d| d.num_days_from_ce())
        .map_err(|e| Error::invalid_argument(format!("invalid date '{}': {}", date, e)))
}

/// Format a day number back into `YYYYMMDD`.
///
/// Out-of-range day numbers are clamped to the representable calendar range.
pub fn format_day(day: Day) -> String {
    NaiveDate::from_num_days_from_ce_opt(day)
        .unwrap_or(if day < 1 { NaiveDate::MIN } else { NaiveDate::MAX })
        .format(DATE_FORMAT)
        .to_string()
}

/// Number of days from `start` to `end` (negative if `end` precedes `start`).
pub fn days_between(start: &str, end: &str) -> Result<i64> {
    Ok(i64::from(parse_day(end)?) - i64::from(parse_day(start)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let day = parse_day("20130101").unwrap();
        assert_eq!(format_day(day), "20130101");
        assert_eq!(parse_day("20130102").unwrap(), day + 1);
    }

    #[test]
    fn test_month_and_leap_boundaries() {
        assert_eq!(
            parse_day("20130301").unwrap() - parse_day("20130228").unwrap(),
            1
        );
        assert_eq!(
            parse_day("20120301").unwrap() - parse_day("20120228").unwrap(),
            2
        );
        assert_eq!(format_day(parse_day("20121231").unwrap() + 1), "20130101");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_day("2013-01-01").is_err());
        assert!(parse_day("20131301").is_err());
        assert!(parse_day("20130230").is_err());
        assert!(parse_day("").is_err());
        assert!(parse_day("2013010").is_err());
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between("20130101", "20130110").unwrap(), 9);
        assert_eq!(days_between("20130110", "20130101").unwrap(), -9);
        assert_eq!(days_between("20130101", "20130101").unwrap(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn day_in_range() -> impl Strategy<Value = Day> {
            let lo = parse_day("19000101").unwrap();
            let hi = parse_day("21001231").unwrap();
            lo..=hi
        }

        proptest! {
            #[test]
            fn formatted_dates_sort_like_days(a in day_in_range(), b in day_in_range()) {
                let (fa, fb) = (format_day(a), format_day(b));
                prop_assert_eq!(parse_day(&fa).unwrap(), a);
                prop_assert_eq!(fa.cmp(&fb), a.cmp(&b));
                prop_assert_eq!(days_between(&fa, &fb).unwrap(), i64::from(b - a));
            }
        }
    }
}
