//! Persistence contracts consumed by the authentication core.
//!
//! Every method is required to be atomic at the single-row level. In
//! particular `LoginAttemptStore::record_attempt` must never lose an increment
//! when several failed logins for the same `(username, origin)` race.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAccountStore, MemoryLoginAttemptStore};
pub use postgres::{PgAccountStore, PgLoginAttemptStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Locked,
    Inactive,
    Deleted,
}

impl AccountStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(Self::Active),
            "locked" => Ok(Self::Locked),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(anyhow::anyhow!("unknown account status: {other}")),
        }
    }
}

/// The slice of the account record authentication needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub status: AccountStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub lock_reason: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Snapshot of the attempt counter for one `(username, origin)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptSnapshot {
    pub count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>>;

    /// Move an active or locked account to `locked` until `until`.
    ///
    /// Inactive and deleted accounts are left untouched.
    async fn lock_account(&self, id: i64, reason: &str, until: DateTime<Utc>) -> Result<()>;

    /// Explicit `locked -> active` transition; clears the lock fields.
    async fn unlock_account(&self, id: i64) -> Result<bool>;

    async fn touch_last_activity(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Rewrite every lock whose `locked_until` has passed back to `active`.
    ///
    /// `locked_until` is kept: a past value tells the lockout policy that the
    /// failures counted before it were already served.
    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Move `active` accounts whose last activity is older than `cutoff` to
    /// `inactive`. Accounts that never signed in are left alone.
    async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    /// Increment the counter for the key, creating it on first use.
    async fn record_attempt(&self, username: &str, origin: &str, success: bool) -> Result<()>;

    async fn reset(&self, username: &str, origin: &str) -> Result<()>;

    /// Reset every origin's counter for `username`; returns the rows touched.
    async fn reset_all(&self, username: &str) -> Result<u64>;

    async fn get_attempts(&self, username: &str, origin: &str) -> Result<AttemptSnapshot>;
}
