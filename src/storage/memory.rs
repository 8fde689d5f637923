//! In-memory stores for tests and local development.
//!
//! A single mutex guards each map, which makes every operation atomic with
//! respect to every other one.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{Account, AccountStatus, AccountStore, AttemptSnapshot, LoginAttemptStore};

#[derive(Debug, Default)]
struct Accounts {
    next_id: i64,
    by_id: HashMap<i64, Account>,
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Accounts>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new active account.
    ///
    /// # Errors
    /// Returns an error if the username or email is already taken.
    pub async fn create(&self, username: &str, email: &str, password_hash: &str) -> Result<Account> {
        let mut accounts = self.accounts.lock().await;
        if accounts
            .by_id
            .values()
            .any(|account| account.username == username || account.email == email)
        {
            return Err(anyhow!("account {username} already exists"));
        }

        accounts.next_id += 1;
        let account = Account {
            id: accounts.next_id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            status: AccountStatus::Active,
            locked_until: None,
            lock_reason: None,
            last_activity_at: None,
        };
        accounts.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    /// Overwrite the lifecycle status, e.g. to deactivate an account.
    pub async fn set_status(&self, id: i64, status: AccountStatus) -> bool {
        let mut accounts = self.accounts.lock().await;
        match accounts.by_id.get_mut(&id) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .by_id
            .values()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.by_id.get(&id).cloned())
    }

    async fn lock_account(&self, id: i64, reason: &str, until: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .by_id
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        if matches!(account.status, AccountStatus::Active | AccountStatus::Locked) {
            account.status = AccountStatus::Locked;
            account.locked_until = Some(until);
            account.lock_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn unlock_account(&self, id: i64) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        match accounts.by_id.get_mut(&id) {
            Some(account) if account.status == AccountStatus::Locked => {
                account.status = AccountStatus::Active;
                account.locked_until = None;
                account.lock_reason = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_activity(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.by_id.get_mut(&id) {
            account.last_activity_at = Some(at);
        }
        Ok(())
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut accounts = self.accounts.lock().await;
        let mut released = 0;
        for account in accounts.by_id.values_mut() {
            let expired = account.status == AccountStatus::Locked
                && account.locked_until.map_or(true, |until| until <= now);
            if expired {
                account.status = AccountStatus::Active;
                account.lock_reason = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut accounts = self.accounts.lock().await;
        let mut deactivated = 0;
        for account in accounts.by_id.values_mut() {
            let idle = account.status == AccountStatus::Active
                && account.last_activity_at.is_some_and(|at| at < cutoff);
            if idle {
                account.status = AccountStatus::Inactive;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
    success: bool,
}

#[derive(Debug, Default)]
pub struct MemoryLoginAttemptStore {
    records: Mutex<HashMap<(String, String), AttemptRecord>>,
}

impl MemoryLoginAttemptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of the most recent attempt for the key, if any.
    pub async fn last_outcome(&self, username: &str, origin: &str) -> Option<bool> {
        let records = self.records.lock().await;
        records
            .get(&(username.to_string(), origin.to_string()))
            .map(|record| record.success)
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryLoginAttemptStore {
    async fn record_attempt(&self, username: &str, origin: &str, success: bool) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .entry((username.to_string(), origin.to_string()))
            .or_insert(AttemptRecord {
                attempts: 0,
                last_attempt: None,
                success,
            });
        record.attempts = record.attempts.saturating_add(1);
        record.last_attempt = Some(Utc::now());
        record.success = success;
        Ok(())
    }

    async fn reset(&self, username: &str, origin: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&(username.to_string(), origin.to_string())) {
            record.attempts = 0;
            record.last_attempt = None;
            record.success = false;
        }
        Ok(())
    }

    async fn reset_all(&self, username: &str) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut cleared = 0;
        for ((name, _), record) in records.iter_mut() {
            if name == username {
                record.attempts = 0;
                record.last_attempt = None;
                record.success = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn get_attempts(&self, username: &str, origin: &str) -> Result<AttemptSnapshot> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(username.to_string(), origin.to_string()))
            .map(|record| AttemptSnapshot {
                count: record.attempts,
                last_attempt: record.last_attempt,
            })
            .unwrap_or_default())
    }
}
