//! Core traits
//!
//! `UserStorage` is the capability the engine consumes for user records.
//! Implementations live in the engine crate; the analytics code only ever
//! sees this trait.

use crate::error::Result;
use crate::types::{Criterion, User, UserId};

/// User record storage.
///
/// Name → id assignment is append-only: once an external id is bound to a
/// user id it never changes. User properties are mutable via `update_user`.
///
/// Thread safety: readers take `&self`, mutation takes `&mut self`; callers
/// serialize writers (the tracker holds its write lock).
pub trait UserStorage: Send + Sync {
    /// Return the id bound to `external_id`, allocating the next id (with an
    /// empty property map) if it has never been seen.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the new user fails.
    fn ensure_user(&mut self, external_id: &str) -> Result<UserId>;

    /// Look up the id bound to `external_id`.
    fn get_id(&self, external_id: &str) -> Option<UserId>;

    /// Get the user record for `user_id`.
    fn get_user(&self, user_id: UserId) -> Option<User>;

    /// Replace the record of the user bound to `user.external_id()`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionViolation` if the external id is unknown,
    /// or a storage error if persisting fails.
    fn update_user(&mut self, user: User) -> Result<UserId>;

    /// Bind an additional external id to an existing user.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `user_id` does not exist.
    fn alias(&mut self, external_id: &str, user_id: UserId) -> Result<()>;

    /// True iff every criterion holds against the user's properties.
    ///
    /// Empty criteria are vacuously true; an unknown user satisfies nothing
    /// but the empty list.
    fn satisfy(&self, user_id: UserId, criteria: &[Criterion]) -> bool;

    /// Number of users (exclusive upper bound of the id space).
    fn len(&self) -> u64;

    /// Whether no user has been registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make all accepted mutations durable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
