//! Funnel conversion counts
//!
//! 1. Enumerate events of the first step dated in `[start, end)`. The first
//!    event of each user that satisfies the criteria enters the funnel.
//! 2. The user's deadline is the first event id dated `within_days` after
//!    the entering event.
//! 3. Walk the user's later events up to the deadline; an event advances
//!    the user one step when it has the next step's type and satisfies the
//!    criteria.
//!
//! `counts[k]` is the number of users that reached step `k`, so the result
//! is non-increasing and `counts[0]` is the number of users that entered.

use super::Analytics;
use crate::criteria::CriteriaEvaluator;
use rustc_hash::FxHashSet;
use std::ops::ControlFlow;
use tracing::debug;
use tracker_core::{parse_day, Criterion, Day, EventId, EventTypeId, Result, UserId};

/// Funnel query: ordered steps, a completion window and optional criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelQuery {
    /// First day (inclusive) of the entering window, `YYYYMMDD`
    pub start_date: String,
    /// Last day (exclusive) of the entering window, `YYYYMMDD`
    pub end_date: String,
    /// Event type of each step, in order
    pub steps: Vec<String>,
    /// Days a user has to complete the funnel after entering it
    pub within_days: u32,
    /// Criteria every counted event must satisfy
    pub event_criteria: Vec<Criterion>,
    /// Criteria the user of every counted event must satisfy
    pub user_criteria: Vec<Criterion>,
}

impl FunnelQuery {
    /// Create a funnel over `steps` with a 7 day completion window.
    pub fn new<S>(start_date: impl Into<String>, end_date: impl Into<String>, steps: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        FunnelQuery {
            start_date: start_date.into(),
            end_date: end_date.into(),
            steps: steps.into_iter().map(Into::into).collect(),
            within_days: 7,
            event_criteria: Vec::new(),
            user_criteria: Vec::new(),
        }
    }

    /// Set the completion window in days.
    pub fn within_days(mut self, days: u32) -> Self {
        self.within_days = days;
        self
    }

    /// Require `key == value` on every counted event.
    pub fn event_criterion(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.event_criteria.push(Criterion::new(key, value));
        self
    }

    /// Require `key == value` on the user of every counted event.
    pub fn user_criterion(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_criteria.push(Criterion::new(key, value));
        self
    }
}

impl Analytics<'_> {
    /// Count the users reaching each step of `query`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if a date is not `YYYYMMDD`
    /// - storage errors while reading payloads for event criteria
    pub fn funnel_counts(&self, query: &FunnelQuery) -> Result<Vec<u64>> {
        let start = parse_day(&query.start_date)?;
        let end = parse_day(&query.end_date)?;
        let num_steps = query.steps.len();
        let mut counts = vec![0u64; num_steps];
        if num_steps == 0 {
            return Ok(counts);
        }

        let step_ids: Vec<Option<EventTypeId>> = query
            .steps
            .iter()
            .map(|step| self.types.get_event_type_id(step))
            .collect();
        let evaluator = CriteriaEvaluator::new(
            self.log,
            self.users,
            &query.event_criteria,
            &query.user_criteria,
        );

        let entries = self.funnel_entries(&query.steps[0], start, end, &evaluator)?;
        for (user_id, first_id) in &entries {
            let reached = if num_steps > 1 {
                self.steps_reached(*user_id, *first_id, query.within_days, &step_ids, &evaluator)?
            } else {
                1
            };
            for count in &mut counts[..reached] {
                *count += 1;
            }
        }

        debug!(target: "tracker::analytics", steps = num_steps, entered = entries.len(), ?counts, "Funnel counted");
        Ok(counts)
    }

    /// First qualifying event of each user entering the funnel, in
    /// enumeration order.
    fn funnel_entries(
        &self,
        first_step: &str,
        start: Day,
        end: Day,
        evaluator: &CriteriaEvaluator<'_>,
    ) -> Result<Vec<(UserId, EventId)>> {
        let mut seen = FxHashSet::default();
        let mut entries = Vec::new();
        self.types
            .enumerate_event_ids(first_step, start, end, |event_id| {
                let user_id = self.log.get_meta(event_id)?.user_id;
                if seen.contains(&user_id) {
                    return Ok(ControlFlow::Continue(()));
                }
                if evaluator.is_unrestricted() || evaluator.matches(event_id, user_id)? {
                    seen.insert(user_id);
                    entries.push((user_id, event_id));
                }
                Ok(ControlFlow::Continue(()))
            })?;
        Ok(entries)
    }

    /// Number of steps (at least 1) `user_id` reached after entering with
    /// `first_id`.
    fn steps_reached(
        &self,
        user_id: UserId,
        first_id: EventId,
        within_days: u32,
        step_ids: &[Option<EventTypeId>],
        evaluator: &CriteriaEvaluator<'_>,
    ) -> Result<usize> {
        let deadline = self.types.find_first_event_id_on_or_after(first_id, within_days);
        let offset = self.user_events.get_event_offset(user_id, first_id)?;
        let mut matched = 1;
        self.user_events
            .enumerate_event_ids(user_id, offset + 1, u64::MAX, |event_id| {
                if event_id >= deadline {
                    return Ok(ControlFlow::Break(()));
                }
                let meta = self.log.get_meta(event_id)?;
                if step_ids[matched] != Some(meta.event_type_id) {
                    return Ok(ControlFlow::Continue(()));
                }
                if !evaluator.is_unrestricted() && !evaluator.matches(event_id, user_id)? {
                    return Ok(ControlFlow::Continue(()));
                }
                matched += 1;
                Ok(if matched == step_ids.len() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })?;
        Ok(matched)
    }
}
