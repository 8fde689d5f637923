//! Command-line argument dispatch.
//!
//! Turns validated CLI matches into an [`Action`], rejecting token secrets
//! that are too short or shared between the two token kinds.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, rate_limit, ARG_DSN, ARG_PORT};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};

pub const MIN_SECRET_BYTES: usize = 32;

fn validate_secrets(access: &SecretString, refresh: &SecretString) -> Result<()> {
    for (name, secret) in [
        ("--access-token-secret", access),
        ("--refresh-token-secret", refresh),
    ] {
        if secret.expose_secret().len() < MIN_SECRET_BYTES {
            return Err(anyhow!("{name} must be at least {MIN_SECRET_BYTES} bytes"));
        }
    }

    if access.expose_secret() == refresh.expose_secret() {
        return Err(anyhow!(
            "--access-token-secret and --refresh-token-secret must differ"
        ));
    }

    Ok(())
}

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or the secrets are unusable.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    validate_secrets(&auth_opts.access_token_secret, &auth_opts.refresh_token_secret)?;

    let rate_limit_opts = rate_limit::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        access_token_secret: auth_opts.access_token_secret,
        refresh_token_secret: auth_opts.refresh_token_secret,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        token_issuer: auth_opts.token_issuer,
        max_login_attempts: auth_opts.max_login_attempts,
        rate_limit_capacity: rate_limit_opts.capacity,
        rate_limit_refill_ms: rate_limit_opts.refill_ms,
        sweep_interval_seconds: rate_limit_opts.sweep_interval_seconds,
        inactive_after_days: rate_limit_opts.inactive_after_days,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSN: &str = "postgres://user@localhost:5432/authgate";
    const ACCESS: &str = "access-secret-0123456789abcdef0123456789";
    const REFRESH: &str = "refresh-secret-0123456789abcdef012345678";

    fn dispatch(access: &str, refresh: &str) -> Result<Action> {
        temp_env::with_vars(
            [
                ("AUTHGATE_DSN", Some(DSN)),
                ("AUTHGATE_ACCESS_TOKEN_SECRET", Some(access)),
                ("AUTHGATE_REFRESH_TOKEN_SECRET", Some(refresh)),
                ("AUTHGATE_MAX_LOGIN_ATTEMPTS", Some("7")),
                ("AUTHGATE_INACTIVE_AFTER_DAYS", Some("30")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["authgate"]);
                handler(&matches)
            },
        )
    }

    #[test]
    fn builds_server_action() -> Result<()> {
        let Action::Server(args) = dispatch(ACCESS, REFRESH)?;

        assert_eq!(args.port, 8080);
        assert_eq!(args.dsn, DSN);
        assert_eq!(args.access_token_secret.expose_secret(), ACCESS);
        assert_eq!(args.max_login_attempts, 7);
        assert_eq!(args.rate_limit_capacity, 60);
        assert_eq!(args.rate_limit_refill_ms, 1000);
        assert_eq!(args.inactive_after_days, 30);
        Ok(())
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = dispatch("too-short", REFRESH);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("--access-token-secret"));
        }
    }

    #[test]
    fn shared_secret_is_rejected() {
        let result = dispatch(ACCESS, ACCESS);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("must differ"));
        }
    }
}
