//! Escalating lockout after repeated failed logins.
//!
//! Backoff follows a fixed step table: 1s, 2s, 4s, 8s, 16s, 32s, 1m, 2m, 4m for
//! attempts 1 through 9 and one hour from attempt 10 onward. Each step gets up
//! to 10% of uniform jitter; the total never exceeds one hour.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{error::AuthError, ledger::LoginAttemptLedger, status::check_status_at};
use crate::storage::AccountStore;

pub const LOCK_REASON: &str = "exceeded maximum attempts";
pub const MAX_LOCK_DURATION: Duration = Duration::from_secs(60 * 60);

const STEP_SECONDS: [u64; 9] = [1, 2, 4, 8, 16, 32, 60, 120, 240];

/// Base delay for the n-th failed attempt, without jitter.
#[must_use]
pub fn step_delay(attempt_count: u32) -> Duration {
    match attempt_count {
        0 => Duration::ZERO,
        n => STEP_SECONDS
            .get(n as usize - 1)
            .map_or(MAX_LOCK_DURATION, |secs| Duration::from_secs(*secs)),
    }
}

#[must_use]
pub fn compute_delay(attempt_count: u32) -> Duration {
    compute_delay_with(attempt_count, &mut rand::thread_rng())
}

/// [`compute_delay`] with a caller-supplied RNG.
#[must_use]
pub fn compute_delay_with<R: Rng + ?Sized>(attempt_count: u32, rng: &mut R) -> Duration {
    let step = step_delay(attempt_count);
    let max_jitter_ms = u64::try_from(step.as_millis() / 10).unwrap_or(u64::MAX);
    let jitter = Duration::from_millis(rng.gen_range(0..=max_jitter_ms));
    (step + jitter).min(MAX_LOCK_DURATION)
}

#[derive(Clone)]
pub struct LockoutPolicy {
    ledger: LoginAttemptLedger,
    accounts: Arc<dyn AccountStore>,
    threshold: u32,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(ledger: LoginAttemptLedger, accounts: Arc<dyn AccountStore>, threshold: u32) -> Self {
        Self {
            ledger,
            accounts,
            threshold: threshold.max(1),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Lock the account if the attempt counter for `(username, origin)` has
    /// reached the threshold.
    ///
    /// # Errors
    /// `AccountLocked` when a lock was applied, `StorageFailure` if the
    /// counter could not be read or the lock could not be written.
    pub async fn decide(
        &self,
        username: &str,
        account_id: i64,
        origin: &str,
    ) -> Result<(), AuthError> {
        self.decide_at(username, account_id, origin, Utc::now()).await
    }

    /// Threshold check for a login whose password already matched.
    ///
    /// The account is read again so a lock applied by a concurrent failure is
    /// honored. A lock that has already elapsed covers every failure counted
    /// before it, so the login goes through instead of locking again.
    ///
    /// # Errors
    /// `AccountLocked` or `AccountInactive` from the fresh status,
    /// `InvalidCredentials` if the account vanished, otherwise as
    /// [`Self::decide`].
    pub async fn confirm(
        &self,
        username: &str,
        account_id: i64,
        origin: &str,
    ) -> Result<(), AuthError> {
        self.confirm_at(username, account_id, origin, Utc::now()).await
    }

    pub(crate) async fn confirm_at(
        &self,
        username: &str,
        account_id: i64,
        origin: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(|err| AuthError::storage(&err))?
            .ok_or(AuthError::InvalidCredentials)?;
        check_status_at(&account, now)?;

        if account.locked_until.is_some_and(|until| until <= now) {
            return Ok(());
        }
        self.decide_at(username, account_id, origin, now).await
    }

    pub(crate) async fn decide_at(
        &self,
        username: &str,
        account_id: i64,
        origin: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let attempts = self.ledger.get_attempts(username, origin).await?;
        if attempts.count < self.threshold {
            return Ok(());
        }

        let delay = compute_delay(attempts.count);
        let until = now
            + chrono::Duration::from_std(delay)
                .map_err(|err| AuthError::StorageFailure(err.to_string()))?;

        self.accounts
            .lock_account(account_id, LOCK_REASON, until)
            .await
            .map_err(|err| AuthError::storage(&err))?;

        warn!(
            username,
            origin,
            account_id,
            attempts = attempts.count,
            lock_seconds = delay.as_secs(),
            "account locked after repeated failed logins"
        );

        Err(AuthError::AccountLocked {
            until,
            reason: LOCK_REASON.to_string(),
        })
    }
}

impl std::fmt::Debug for LockoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutPolicy")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
