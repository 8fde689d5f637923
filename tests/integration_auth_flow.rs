use anyhow::Result;
use authgate::{
    auth::{
        hash_password, AuthConfig, AuthError, Authenticator, Deadline, RevocationRegistry,
        TokenIssuer, TokenKind, LOCK_REASON,
    },
    rate_limit::ClientRateLimiter,
    storage::{AccountStatus, AccountStore, MemoryAccountStore, MemoryLoginAttemptStore},
    sweep::Sweeper,
};
use chrono::Utc;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

const ORIGIN: &str = "1.2.3.4";

struct Harness {
    auth: Authenticator,
    accounts: Arc<MemoryAccountStore>,
    revocations: Arc<RevocationRegistry>,
    account_id: i64,
}

async fn harness() -> Result<Harness> {
    let accounts = Arc::new(MemoryAccountStore::new());
    let account = accounts
        .create("bob", "bob@example.com", &hash_password("correct horse")?)
        .await?;

    let config = AuthConfig::new()
        .with_access_token_ttl_seconds(60)
        .with_refresh_token_ttl_seconds(3600)
        .with_token_issuer("authgate-test".to_string());
    let revocations = Arc::new(RevocationRegistry::new());
    let tokens = Arc::new(TokenIssuer::new(
        SecretString::from("integration-access-secret-0123456789abcd".to_string()),
        SecretString::from("integration-refresh-secret-0123456789abc".to_string()),
        &config,
        Arc::clone(&revocations),
    ));
    let auth = Authenticator::new(
        accounts.clone(),
        Arc::new(MemoryLoginAttemptStore::new()),
        tokens,
        &config,
    );

    Ok(Harness {
        auth,
        accounts,
        revocations,
        account_id: account.id,
    })
}

#[tokio::test]
async fn five_wrong_passwords_lock_the_account() -> Result<()> {
    let h = harness().await?;

    for _ in 0..4 {
        let result = h
            .auth
            .authenticate("bob", "wrong", ORIGIN, Deadline::NONE)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let result = h
        .auth
        .authenticate("bob", "wrong", ORIGIN, Deadline::NONE)
        .await;
    let (until, reason) = match result {
        Err(AuthError::AccountLocked { until, reason }) => (until, reason),
        other => panic!("expected AccountLocked, got {other:?}"),
    };
    assert_eq!(reason, LOCK_REASON);
    assert!(until > Utc::now());

    let stored = h.accounts.find_by_id(h.account_id).await?;
    let stored = stored.ok_or_else(|| anyhow::anyhow!("account vanished"))?;
    assert_eq!(stored.status, AccountStatus::Locked);
    assert!(stored.locked_until.is_some_and(|at| at > Utc::now()));

    // The right password does not get past an active lock.
    let result = h
        .auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await;
    assert!(matches!(result, Err(AuthError::AccountLocked { .. })));

    Ok(())
}

#[tokio::test]
async fn failures_from_another_origin_do_not_count() -> Result<()> {
    let h = harness().await?;

    for _ in 0..4 {
        let _ = h
            .auth
            .authenticate("bob", "wrong", ORIGIN, Deadline::NONE)
            .await;
    }
    let result = h
        .auth
        .authenticate("bob", "wrong", "5.6.7.8", Deadline::NONE)
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    let pair = h
        .auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await?;
    assert!(!pair.access_token.is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_access_token() -> Result<()> {
    let h = harness().await?;

    let pair = h
        .auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await?;
    let session = h.auth.authorize(&pair.access_token, Deadline::NONE).await?;
    assert_eq!(session.account.id, h.account_id);
    assert_eq!(session.claims.kind, TokenKind::Access);

    h.auth.invalidate(&pair.access_token, Deadline::NONE)?;

    let result = h
        .auth
        .tokens()
        .validate(&pair.access_token, TokenKind::Access);
    assert!(matches!(result, Err(AuthError::TokenRevoked)));
    assert_eq!(h.revocations.len(), 1);

    // The refresh token is untouched by logout.
    h.auth
        .tokens()
        .validate(&pair.refresh_token, TokenKind::Refresh)?;
    Ok(())
}

#[tokio::test]
async fn refresh_issues_a_new_pair_and_retires_the_old_refresh_token() -> Result<()> {
    let h = harness().await?;

    let pair = h
        .auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await?;

    // An access token is never accepted as a refresh token.
    let result = h.auth.refresh(&pair.access_token, Deadline::NONE).await;
    assert!(matches!(result, Err(AuthError::TokenWrongKind)));

    let next = h.auth.refresh(&pair.refresh_token, Deadline::NONE).await?;
    assert_ne!(next.refresh_token, pair.refresh_token);
    h.auth.authorize(&next.access_token, Deadline::NONE).await?;

    let replay = h.auth.refresh(&pair.refresh_token, Deadline::NONE).await;
    assert!(matches!(replay, Err(AuthError::TokenRevoked)));
    Ok(())
}

#[tokio::test]
async fn sweeper_releases_expired_locks() -> Result<()> {
    let h = harness().await?;

    for _ in 0..5 {
        let _ = h
            .auth
            .authenticate("bob", "wrong", ORIGIN, Deadline::NONE)
            .await;
    }
    // Let the lock run out.
    let past = Utc::now() - chrono::Duration::seconds(5);
    h.accounts
        .lock_account(h.account_id, LOCK_REASON, past)
        .await?;

    let sweeper = Sweeper::new(
        Arc::clone(&h.revocations),
        Arc::new(ClientRateLimiter::new(10, Duration::from_secs(1))),
        h.accounts.clone(),
        Duration::from_secs(60),
        Duration::from_secs(90 * 24 * 60 * 60),
    );
    let report = sweeper.run_once().await;
    assert_eq!(report.locks_released, 1);

    h.auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await?;
    Ok(())
}

#[tokio::test]
async fn unlock_clears_the_counter() -> Result<()> {
    let h = harness().await?;

    for _ in 0..5 {
        let _ = h
            .auth
            .authenticate("bob", "wrong", ORIGIN, Deadline::NONE)
            .await;
    }
    assert!(h.auth.unlock(h.account_id).await?);

    h.auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await?;
    let stored = h.accounts.find_by_id(h.account_id).await?;
    assert_eq!(stored.map(|a| a.status), Some(AccountStatus::Active));
    Ok(())
}

#[tokio::test]
async fn sweeper_deactivates_idle_accounts() -> Result<()> {
    let h = harness().await?;
    h.accounts
        .touch_last_activity(h.account_id, Utc::now() - chrono::Duration::days(120))
        .await?;

    let sweeper = Sweeper::new(
        Arc::clone(&h.revocations),
        Arc::new(ClientRateLimiter::new(10, Duration::from_secs(1))),
        h.accounts.clone(),
        Duration::from_secs(60),
        Duration::from_secs(90 * 24 * 60 * 60),
    );
    assert_eq!(sweeper.run_once().await.accounts_deactivated, 1);

    let result = h
        .auth
        .authenticate("bob", "correct horse", ORIGIN, Deadline::NONE)
        .await;
    assert!(matches!(result, Err(AuthError::AccountInactive)));
    Ok(())
}
