//! Per-user event sequences
//!
//! Maps each user id to the ids of its events in ingestion order. The index
//! is held in memory and rebuilt from the event log's metadata mirror on
//! open, so it is never behind the log.

use std::ops::ControlFlow;
use tracker_core::{Error, EventId, Result, UserId};

/// Secondary index: UserId → event ids
#[derive(Debug, Default)]
pub struct UserEventIndex {
    sequences: Vec<Vec<EventId>>,
    events: u64,
}

impl UserEventIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event_id` to the sequence of `user_id`.
    ///
    /// Sequences are created lazily on the first event of a user.
    pub fn add_event(&mut self, user_id: UserId, event_id: EventId) {
        let slot = user_id as usize;
        if slot >= self.sequences.len() {
            self.sequences.resize_with(slot + 1, Vec::new);
        }
        self.sequences[slot].push(event_id);
        self.events += 1;
    }

    /// Visit up to `max_count` ids of `user_id` starting at `offset`.
    ///
    /// Stops as soon as the callback returns `ControlFlow::Break`. A user
    /// without events, or an offset past the end, visits nothing.
    pub fn enumerate_event_ids<F>(
        &self,
        user_id: UserId,
        offset: u64,
        max_count: u64,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(EventId) -> Result<ControlFlow<()>>,
    {
        let ids = self.sequence(user_id);
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(ids.len());
        let take = usize::try_from(max_count).unwrap_or(usize::MAX);
        for id in ids[start..].iter().take(take) {
            if callback(*id)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Position of `event_id` within the sequence of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionViolation` if the event is not in the
    /// user's sequence.
    pub fn get_event_offset(&self, user_id: UserId, event_id: EventId) -> Result<u64> {
        self.sequence(user_id)
            .binary_search(&event_id)
            .map(|offset| offset as u64)
            .map_err(|_| {
                Error::precondition(format!(
                    "event {} is not attributed to user {}",
                    event_id, user_id
                ))
            })
    }

    /// Number of events of `user_id`.
    pub fn user_len(&self, user_id: UserId) -> u64 {
        self.sequence(user_id).len() as u64
    }

    /// Number of users with at least one sequence slot.
    pub fn users(&self) -> usize {
        self.sequences.len()
    }

    /// Total number of indexed events.
    pub fn len(&self) -> u64 {
        self.events
    }

    /// Whether no event is indexed.
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    fn sequence(&self, user_id: UserId) -> &[EventId] {
        self.sequences
            .get(user_id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(index: &UserEventIndex, user: UserId, offset: u64, max: u64) -> Vec<EventId> {
        let mut out = Vec::new();
        index
            .enumerate_event_ids(user, offset, max, |id| {
                out.push(id);
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        out
    }

    #[test]
    fn test_sequences_per_user() {
        let mut index = UserEventIndex::new();
        index.add_event(0, 1);
        index.add_event(2, 2);
        index.add_event(0, 3);
        index.add_event(0, 7);

        assert_eq!(collect(&index, 0, 0, u64::MAX), vec![1, 3, 7]);
        assert_eq!(collect(&index, 2, 0, u64::MAX), vec![2]);
        assert_eq!(collect(&index, 1, 0, u64::MAX), Vec::<EventId>::new());
        assert_eq!(collect(&index, 9, 0, u64::MAX), Vec::<EventId>::new());
        assert_eq!(index.len(), 4);
        assert_eq!(index.users(), 3);
    }

    #[test]
    fn test_offset_and_max_count() {
        let mut index = UserEventIndex::new();
        for id in 10..20 {
            index.add_event(4, id);
        }
        assert_eq!(collect(&index, 4, 3, 2), vec![13, 14]);
        assert_eq!(collect(&index, 4, 8, 100), vec![18, 19]);
        assert_eq!(collect(&index, 4, 10, 100), Vec::<EventId>::new());
        assert_eq!(collect(&index, 4, 0, 0), Vec::<EventId>::new());
    }

    #[test]
    fn test_early_stop() {
        let mut index = UserEventIndex::new();
        for id in 0..5 {
            index.add_event(0, id);
        }
        let mut seen = Vec::new();
        index
            .enumerate_event_ids(0, 0, u64::MAX, |id| {
                seen.push(id);
                Ok(if id == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_get_event_offset() {
        let mut index = UserEventIndex::new();
        for id in [2, 5, 9] {
            index.add_event(1, id);
        }
        assert_eq!(index.get_event_offset(1, 5).unwrap(), 1);
        assert!(matches!(
            index.get_event_offset(1, 6),
            Err(Error::PreconditionViolation(_))
        ));
        assert!(index.get_event_offset(3, 2).is_err());
    }
}
