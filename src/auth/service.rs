//! Login, refresh and logout flows.
//!
//! `authenticate` runs a fixed sequence: lookup, status guard, password check,
//! lockout decision, reset and mint. The lockout decision runs on both the
//! failure and the success branch, so a correct password never bypasses a
//! lock that a concurrent failure has just applied. On the success branch a
//! lock that has already elapsed counts as served.
//!
//! Unknown usernames pay for one Argon2 verification against a throwaway hash
//! and are counted in the ledger like any other failure.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::{
    error::AuthError,
    ledger::LoginAttemptLedger,
    lockout::LockoutPolicy,
    password::{dummy_hash, verify_password},
    state::AuthConfig,
    status::check_status,
    token::{Claims, TokenIssuer, TokenKind, TokenPair},
};
use crate::storage::{Account, AccountStore, LoginAttemptStore};

/// Point in time after which an operation refuses to start.
///
/// Checked on entry only; storage calls already in flight are not aborted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const NONE: Self = Self(None);

    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|instant| Instant::now() >= instant)
    }

    fn check(self) -> Result<(), AuthError> {
        if self.is_expired() {
            Err(AuthError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An access token that passed validation, together with the account it names.
#[derive(Debug, Clone)]
pub struct Session {
    pub claims: Claims,
    pub account: Account,
}

#[derive(Clone)]
pub struct Authenticator {
    accounts: Arc<dyn AccountStore>,
    ledger: LoginAttemptLedger,
    lockout: LockoutPolicy,
    tokens: Arc<TokenIssuer>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("lockout", &self.lockout)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        attempts: Arc<dyn LoginAttemptStore>,
        tokens: Arc<TokenIssuer>,
        config: &AuthConfig,
    ) -> Self {
        let ledger = LoginAttemptLedger::new(attempts);
        let lockout = LockoutPolicy::new(
            ledger.clone(),
            Arc::clone(&accounts),
            config.max_login_attempts(),
        );
        Self {
            accounts,
            ledger,
            lockout,
            tokens,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenIssuer> {
        &self.tokens
    }

    #[must_use]
    pub fn ledger(&self) -> &LoginAttemptLedger {
        &self.ledger
    }

    /// Exchange a username and password for a fresh token pair.
    ///
    /// # Errors
    /// `InvalidCredentials` for unknown users and wrong passwords,
    /// `AccountLocked`/`AccountInactive` from the status guard or the lockout
    /// policy, `StorageFailure`/`SigningFailure` for infrastructure errors and
    /// `Cancelled` if the deadline had already passed.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        origin: &str,
        deadline: Deadline,
    ) -> Result<TokenPair, AuthError> {
        deadline.check()?;

        let Some(account) = self
            .accounts
            .find_by_username(username)
            .await
            .map_err(|err| AuthError::storage(&err))?
        else {
            password_matches(password, dummy_hash()).await;
            self.ledger.record_attempt(username, origin, false).await?;
            info!(username, origin, "login rejected: unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if let Err(err) = check_status(&account) {
            info!(username, origin, code = %err.code(), "login rejected by account status");
            return Err(err);
        }

        if !password_matches(password, &account.password_hash).await {
            self.ledger.record_attempt(username, origin, false).await?;
            self.lockout.decide(username, account.id, origin).await?;
            let attempts = self.ledger.get_attempts(username, origin).await?;
            warn!(
                username,
                origin,
                attempts = attempts.count,
                threshold = self.lockout.threshold(),
                "login rejected: wrong password"
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.confirm(username, account.id, origin).await?;

        self.ledger.reset(username, origin).await?;
        if let Err(err) = self
            .accounts
            .touch_last_activity(account.id, Utc::now())
            .await
        {
            error!("failed to stamp last activity for account {}: {err:#}", account.id);
        }

        let pair = self.tokens.issue_pair(account.id, &account.username)?;
        info!(username, origin, account_id = account.id, "login succeeded");
        Ok(pair)
    }

    /// Trade a refresh token for a new pair bound to the same subject.
    ///
    /// The presented refresh token is revoked, so each one can be used once.
    ///
    /// # Errors
    /// Any token validation error, a status-guard rejection for the subject,
    /// or `SigningFailure`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        deadline: Deadline,
    ) -> Result<TokenPair, AuthError> {
        deadline.check()?;

        let claims = self.tokens.validate(refresh_token, TokenKind::Refresh)?;
        let account = self.load_subject(&claims).await?;
        check_status(&account)?;

        let pair = self.tokens.issue_pair(account.id, &account.username)?;
        self.tokens
            .revocations()
            .revoke(&claims.jti, claims.expires_at());
        info!(account_id = account.id, "token pair refreshed");
        Ok(pair)
    }

    /// Log out: revoke the access token until its natural expiry.
    ///
    /// # Errors
    /// Any access-token validation error, or `Cancelled`.
    pub fn invalidate(&self, access_token: &str, deadline: Deadline) -> Result<(), AuthError> {
        deadline.check()?;
        self.tokens.invalidate(access_token)?;
        Ok(())
    }

    /// Validate an access token and re-check the subject's status.
    ///
    /// # Errors
    /// Any access-token validation error or status-guard rejection.
    pub async fn authorize(
        &self,
        access_token: &str,
        deadline: Deadline,
    ) -> Result<Session, AuthError> {
        deadline.check()?;

        let claims = self.tokens.validate(access_token, TokenKind::Access)?;
        let account = self.load_subject(&claims).await?;
        check_status(&account)?;
        Ok(Session { claims, account })
    }

    /// Explicit `locked -> active` transition. Returns false if the account
    /// was not locked. The attempt counters of every origin are cleared with
    /// the lock.
    ///
    /// # Errors
    /// `StorageFailure` if the update or the counter reset fails.
    pub async fn unlock(&self, account_id: i64) -> Result<bool, AuthError> {
        let Some(account) = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(|err| AuthError::storage(&err))?
        else {
            return Ok(false);
        };

        let unlocked = self
            .accounts
            .unlock_account(account_id)
            .await
            .map_err(|err| AuthError::storage(&err))?;
        if unlocked {
            let cleared = self.ledger.reset_all(&account.username).await?;
            info!(account_id, cleared, "account unlocked");
        }
        Ok(unlocked)
    }

    async fn load_subject(&self, claims: &Claims) -> Result<Account, AuthError> {
        self.accounts
            .find_by_id(claims.sub)
            .await
            .map_err(|err| AuthError::storage(&err))?
            .ok_or(AuthError::InvalidCredentials)
    }
}

/// Argon2 verification off the async executor.
async fn password_matches(password: &str, stored_hash: &str) -> bool {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    match tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await {
        Ok(matches) => matches,
        Err(err) => {
            error!("password verification task failed: {err}");
            false
        }
    }
}
