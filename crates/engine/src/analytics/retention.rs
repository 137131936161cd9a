//! Retention cohort table
//!
//! The range `[start, end]` is cut into cohorts of `days_per_cohort` days.
//! Row `i` is the set of users that fired the row event type during cohort
//! `i`; column sets are computed the same way for the column event type
//! over `rows + columns` consecutive windows starting at `start`.
//!
//! ```text
//! table[i][0]     = |row[i]|
//! table[i][j + 1] = |row[i] ∩ column[i + j]|
//! ```
//!
//! Column 1 is therefore the cohort's own window and every cell is bounded
//! by the cohort size in column 0.

use super::Analytics;
use rustc_hash::FxHashSet;
use std::ops::ControlFlow;
use tracing::debug;
use tracker_core::{days_between, parse_day, Day, Result, UserId};

/// Dense `rows × (columns + 1)` matrix of user counts.
pub type RetentionTable = Vec<Vec<u64>>;

/// Retention query over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionQuery {
    /// First day (inclusive), `YYYYMMDD`
    pub start_date: String,
    /// Last day (inclusive), `YYYYMMDD`
    pub end_date: String,
    /// Length of each cohort window in days
    pub days_per_cohort: u32,
    /// Number of retention periods after column 0
    pub num_columns: u32,
    /// Event type defining cohort membership
    pub row_event_type: String,
    /// Event type counted as a return
    pub column_event_type: String,
}

impl RetentionQuery {
    /// Create a daily retention query with 7 periods.
    pub fn new(
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        row_event_type: impl Into<String>,
        column_event_type: impl Into<String>,
    ) -> Self {
        RetentionQuery {
            start_date: start_date.into(),
            end_date: end_date.into(),
            days_per_cohort: 1,
            num_columns: 7,
            row_event_type: row_event_type.into(),
            column_event_type: column_event_type.into(),
        }
    }

    /// Set the cohort length in days.
    pub fn days_per_cohort(mut self, days: u32) -> Self {
        self.days_per_cohort = days;
        self
    }

    /// Set the number of retention periods.
    pub fn columns(mut self, columns: u32) -> Self {
        self.num_columns = columns;
        self
    }
}

impl Analytics<'_> {
    /// Compute the retention table of `query`.
    ///
    /// A zero cohort length, or a range shorter than one cohort, yields an
    /// empty table.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if a date is not `YYYYMMDD`.
    pub fn retention_table(&self, query: &RetentionQuery) -> Result<RetentionTable> {
        let start = parse_day(&query.start_date)?;
        let span = days_between(&query.start_date, &query.end_date)? + 1;
        if query.days_per_cohort == 0 || span <= 0 {
            return Ok(RetentionTable::new());
        }
        let num_rows = (span / i64::from(query.days_per_cohort)) as usize;
        let num_columns = query.num_columns as usize;

        let rows = self.user_sets(&query.row_event_type, start, query.days_per_cohort, num_rows)?;
        let columns = self.user_sets(
            &query.column_event_type,
            start,
            query.days_per_cohort,
            num_rows + num_columns,
        )?;

        let table: RetentionTable = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut cells = Vec::with_capacity(num_columns + 1);
                cells.push(row.len() as u64);
                cells.extend(
                    columns[i..i + num_columns]
                        .iter()
                        .map(|column| column.iter().filter(|user| row.contains(user)).count() as u64),
                );
                cells
            })
            .collect();

        debug!(target: "tracker::analytics", rows = num_rows, columns = num_columns, "Retention table computed");
        Ok(table)
    }

    /// Distinct users that fired `event_type` in each of `count` windows of
    /// `days` days starting at `start`.
    fn user_sets(
        &self,
        event_type: &str,
        start: Day,
        days: u32,
        count: usize,
    ) -> Result<Vec<FxHashSet<UserId>>> {
        let days = i64::from(days);
        let mut sets = Vec::with_capacity(count);
        for window in 0..count as i64 {
            let from = clamp_day(i64::from(start) + window * days);
            let to = clamp_day(i64::from(start) + (window + 1) * days);
            let mut users = FxHashSet::default();
            self.types.enumerate_event_ids(event_type, from, to, |event_id| {
                users.insert(self.log.get_meta(event_id)?.user_id);
                Ok(ControlFlow::Continue(()))
            })?;
            sets.push(users);
        }
        Ok(sets)
    }
}

fn clamp_day(day: i64) -> Day {
    day.clamp(i64::from(Day::MIN), i64::from(Day::MAX)) as Day
}

#[cfg(test)]
mod tests {
    use super::super::fixture::Fixture;
    use super::*;

    #[test]
    fn test_single_cohort_retained() {
        let mut f = Fixture::new();
        f.add("A", "u1", "20130101");
        f.add("B", "u1", "20130101");

        let query = RetentionQuery::new("20130101", "20130101", "A", "B").columns(1);
        assert_eq!(f.analytics().retention_table(&query).unwrap(), vec![vec![1, 1]]);
    }

    #[test]
    fn test_daily_cohorts() {
        let mut f = Fixture::new();
        // day 1 cohort: u1 u2; day 2 cohort: u3
        f.add("signup", "u1", "20130101");
        f.add("signup", "u2", "20130101");
        f.add("visit", "u1", "20130101");
        f.add("signup", "u3", "20130102");
        f.add("visit", "u1", "20130102");
        f.add("visit", "u2", "20130102");
        f.add("visit", "u3", "20130103");
        f.add("visit", "u1", "20130104");

        let query = RetentionQuery::new("20130101", "20130102", "signup", "visit").columns(3);
        let table = f.analytics().retention_table(&query).unwrap();
        assert_eq!(table, vec![vec![2, 1, 2, 0], vec![1, 0, 1, 0]]);
    }

    #[test]
    fn test_multi_day_cohorts() {
        let mut f = Fixture::new();
        f.add("A", "u1", "20130101");
        f.add("A", "u2", "20130102");
        f.add("B", "u2", "20130103");
        f.add("A", "u3", "20130104");
        f.add("B", "u1", "20130105");

        // range of 5 days with 2-day cohorts: 2 rows, day 5 left over
        let query = RetentionQuery::new("20130101", "20130105", "A", "B")
            .days_per_cohort(2)
            .columns(2);
        let table = f.analytics().retention_table(&query).unwrap();
        assert_eq!(table, vec![vec![2, 0, 1], vec![1, 0, 0]]);
    }

    #[test]
    fn test_degenerate_ranges() {
        let mut f = Fixture::new();
        f.add("A", "u1", "20130101");

        let zero = RetentionQuery::new("20130101", "20130110", "A", "A").days_per_cohort(0);
        assert!(f.analytics().retention_table(&zero).unwrap().is_empty());

        let reversed = RetentionQuery::new("20130110", "20130101", "A", "A");
        assert!(f.analytics().retention_table(&reversed).unwrap().is_empty());

        let short = RetentionQuery::new("20130101", "20130102", "A", "A").days_per_cohort(7);
        assert!(f.analytics().retention_table(&short).unwrap().is_empty());

        let unknown = RetentionQuery::new("20130101", "20130101", "Z", "Y").columns(2);
        assert_eq!(f.analytics().retention_table(&unknown).unwrap(), vec![vec![0, 0, 0]]);
    }
}
