//! Postgres-backed stores (see `sql/schema.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::{Account, AccountStatus, AccountStore, AttemptSnapshot, LoginAttemptStore};

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, status, locked_until, \
                               lock_reason, last_activity_at";

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new active account and return it.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including unique violations).
    pub async fn create(&self, username: &str, email: &str, password_hash: &str) -> Result<Account> {
        let query = format!(
            "INSERT INTO accounts (username, email, password_hash, status) \
             VALUES ($1, $2, $3, 'active') RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert account")?;
        account_from_row(&row)
    }

    async fn fetch_one_by(&self, column: &str, bind: AccountKey<'_>) -> Result<Option<Account>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1 AND deleted_at IS NULL"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let query = sqlx::query(&query);
        let query = match bind {
            AccountKey::Id(id) => query.bind(id),
            AccountKey::Username(username) => query.bind(username),
        };
        let row = query
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;
        row.as_ref().map(account_from_row).transpose()
    }
}

enum AccountKey<'a> {
    Id(i64),
    Username(&'a str),
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let status: String = row.try_get("status")?;
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        status: status.parse::<AccountStatus>()?,
        locked_until: row.try_get("locked_until")?,
        lock_reason: row.try_get("lock_reason")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.fetch_one_by("username", AccountKey::Username(username))
            .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>> {
        self.fetch_one_by("id", AccountKey::Id(id)).await
    }

    async fn lock_account(&self, id: i64, reason: &str, until: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET status = 'locked',
                locked_until = $2,
                lock_reason = $3,
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('active', 'locked')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(until)
            .bind(reason)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to lock account")?;
        Ok(())
    }

    async fn unlock_account(&self, id: i64) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET status = 'active',
                locked_until = NULL,
                lock_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'locked'
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to unlock account")?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_activity(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE accounts SET last_activity_at = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update last activity")?;
        Ok(())
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE accounts
            SET status = 'active',
                lock_reason = NULL,
                updated_at = NOW()
            WHERE status = 'locked'
              AND (locked_until IS NULL OR locked_until <= $1)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to release expired locks")?;
        Ok(result.rows_affected())
    }

    async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE accounts
            SET status = 'inactive',
                updated_at = NOW()
            WHERE status = 'active'
              AND last_activity_at < $1
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to deactivate idle accounts")?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone, Debug)]
pub struct PgLoginAttemptStore {
    pool: PgPool,
}

impl PgLoginAttemptStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptStore for PgLoginAttemptStore {
    async fn record_attempt(&self, username: &str, origin: &str, success: bool) -> Result<()> {
        // Single-statement upsert; the row lock taken by ON CONFLICT serializes
        // concurrent increments for the same key.
        let query = r"
            INSERT INTO login_attempts (username, origin, attempts, last_attempt, success)
            VALUES ($1, $2, 1, NOW(), $3)
            ON CONFLICT (username, origin) DO UPDATE
            SET attempts = login_attempts.attempts + 1,
                last_attempt = NOW(),
                success = EXCLUDED.success
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .bind(origin)
            .bind(success)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;
        Ok(())
    }

    async fn reset(&self, username: &str, origin: &str) -> Result<()> {
        let query = r"
            UPDATE login_attempts
            SET attempts = 0,
                last_attempt = NULL,
                success = FALSE
            WHERE username = $1
              AND origin = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .bind(origin)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset login attempts")?;
        Ok(())
    }

    async fn reset_all(&self, username: &str) -> Result<u64> {
        let query = r"
            UPDATE login_attempts
            SET attempts = 0,
                last_attempt = NULL,
                success = FALSE
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset login attempts")?;
        Ok(result.rows_affected())
    }

    async fn get_attempts(&self, username: &str, origin: &str) -> Result<AttemptSnapshot> {
        let query = r"
            SELECT attempts, last_attempt
            FROM login_attempts
            WHERE username = $1
              AND origin = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(origin)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load login attempts")?;

        let Some(row) = row else {
            return Ok(AttemptSnapshot::default());
        };
        let attempts: i32 = row.try_get("attempts")?;
        Ok(AttemptSnapshot {
            count: u32::try_from(attempts).unwrap_or(0),
            last_attempt: row.try_get("last_attempt")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TEST_DSN_ENV: &str = "AUTHGATE_TEST_DSN";

    async fn pool() -> Option<PgPool> {
        let Ok(dsn) = std::env::var(TEST_DSN_ENV) else {
            eprintln!("skipping postgres test: {TEST_DSN_ENV} not set");
            return None;
        };
        let pool = PgPool::connect(&dsn).await.ok()?;
        sqlx::raw_sql(include_str!("../../sql/schema.sql"))
            .execute(&pool)
            .await
            .ok()?;
        Some(pool)
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", ulid::Ulid::new())
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() -> Result<()> {
        let Some(pool) = pool().await else {
            return Ok(());
        };
        let store = Arc::new(PgLoginAttemptStore::new(pool));
        let username = unique("race");

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                let username = username.clone();
                tokio::spawn(async move { store.record_attempt(&username, "10.0.0.1", false).await })
            })
            .collect();
        for handle in handles {
            handle.await??;
        }

        assert_eq!(store.get_attempts(&username, "10.0.0.1").await?.count, 20);

        store.reset(&username, "10.0.0.1").await?;
        let snapshot = store.get_attempts(&username, "10.0.0.1").await?;
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.last_attempt, None);
        Ok(())
    }

    #[tokio::test]
    async fn lock_and_release_round_trip() -> Result<()> {
        let Some(pool) = pool().await else {
            return Ok(());
        };
        let store = PgAccountStore::new(pool);
        let username = unique("lock");
        let account = store
            .create(&username, &format!("{username}@example.com"), "hash")
            .await?;

        let until = Utc::now() - chrono::Duration::seconds(1);
        store.lock_account(account.id, "test", until).await?;
        let locked = store.find_by_id(account.id).await?.context("missing account")?;
        assert_eq!(locked.status, AccountStatus::Locked);
        assert_eq!(locked.lock_reason.as_deref(), Some("test"));

        assert!(store.release_expired_locks(Utc::now()).await? >= 1);
        let released = store
            .find_by_username(&username)
            .await?
            .context("missing account")?;
        assert_eq!(released.status, AccountStatus::Active);
        assert_eq!(released.lock_reason, None);
        assert!(released.locked_until.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn idle_accounts_are_deactivated() -> Result<()> {
        let Some(pool) = pool().await else {
            return Ok(());
        };
        let store = PgAccountStore::new(pool);
        let username = unique("idle");
        let account = store
            .create(&username, &format!("{username}@example.com"), "hash")
            .await?;
        let now = Utc::now();
        store
            .touch_last_activity(account.id, now - chrono::Duration::days(91))
            .await?;

        assert!(store.deactivate_idle(now - chrono::Duration::days(90)).await? >= 1);
        let account = store.find_by_id(account.id).await?.context("missing account")?;
        assert_eq!(account.status, AccountStatus::Inactive);
        Ok(())
    }

    #[tokio::test]
    async fn reset_all_spans_origins() -> Result<()> {
        let Some(pool) = pool().await else {
            return Ok(());
        };
        let store = PgLoginAttemptStore::new(pool);
        let username = unique("reset");
        store.record_attempt(&username, "10.0.0.1", false).await?;
        store.record_attempt(&username, "10.0.0.2", false).await?;

        assert_eq!(store.reset_all(&username).await?, 2);
        assert_eq!(store.get_attempts(&username, "10.0.0.1").await?.count, 0);
        assert_eq!(store.get_attempts(&username, "10.0.0.2").await?.count, 0);
        Ok(())
    }
}
