//! Account lifecycle guard, consulted before any password comparison.

use chrono::{DateTime, Utc};

use super::error::AuthError;
use crate::storage::{Account, AccountStatus};

/// Reject accounts that may not start a session right now.
///
/// # Errors
/// `AccountLocked` while a lock is in force, `AccountInactive` for inactive
/// and deleted accounts.
pub fn check_status(account: &Account) -> Result<(), AuthError> {
    check_status_at(account, Utc::now())
}

/// Same as [`check_status`] with an explicit clock.
///
/// A lock whose `locked_until` has passed is treated as released even if the
/// stored status still reads `locked`.
///
/// # Errors
/// See [`check_status`].
pub fn check_status_at(account: &Account, now: DateTime<Utc>) -> Result<(), AuthError> {
    match account.status {
        AccountStatus::Active => Ok(()),
        AccountStatus::Inactive | AccountStatus::Deleted => Err(AuthError::AccountInactive),
        AccountStatus::Locked => match account.locked_until {
            Some(until) if until > now => Err(AuthError::AccountLocked {
                until,
                reason: account.lock_reason.clone().unwrap_or_default(),
            }),
            _ => Ok(()),
        },
    }
}
