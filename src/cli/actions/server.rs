use crate::{api, auth::AuthConfig, rate_limit::ClientRateLimiter};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub token_issuer: String,
    pub max_login_attempts: u32,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_ms: u64,
    pub sweep_interval_seconds: u64,
    pub inactive_after_days: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = AuthConfig::new()
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_token_issuer(args.token_issuer)
        .with_max_login_attempts(args.max_login_attempts);

    let limiter = Arc::new(ClientRateLimiter::new(
        args.rate_limit_capacity,
        Duration::from_millis(args.rate_limit_refill_ms),
    ));

    api::new(
        args.port,
        args.dsn,
        args.access_token_secret,
        args.refresh_token_secret,
        auth_config,
        limiter,
        Duration::from_secs(args.sweep_interval_seconds),
        Duration::from_secs(args.inactive_after_days.saturating_mul(SECONDS_PER_DAY)),
    )
    .await
}

fn log_startup_args(args: &Args) {
    // Never log credentials embedded in the DSN.
    let db_host = Url::parse(&args.dsn)
        .ok()
        .and_then(|dsn| dsn.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        port = args.port,
        db_host = %db_host,
        token_issuer = %args.token_issuer,
        access_token_ttl_seconds = args.access_token_ttl_seconds,
        refresh_token_ttl_seconds = args.refresh_token_ttl_seconds,
        max_login_attempts = args.max_login_attempts,
        rate_limit_capacity = args.rate_limit_capacity,
        rate_limit_refill_ms = args.rate_limit_refill_ms,
        sweep_interval_seconds = args.sweep_interval_seconds,
        inactive_after_days = args.inactive_after_days,
        "starting authgate"
    );
}
