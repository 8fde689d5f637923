//! # Authgate (account authentication and session credentials)
//!
//! `authgate` verifies usernames and passwords against stored account records
//! and issues signed, short-lived access tokens paired with longer-lived
//! refresh tokens.
//!
//! ## Login Throttling
//!
//! Every login attempt is recorded per `(username, origin)` pair. Once the
//! consecutive failure count reaches the configured threshold the account is
//! locked and a progressive delay is reported back to the caller. A success
//! clears the counter.
//!
//! ## Tokens
//!
//! Tokens are compact `HS256` JWS strings. Access and refresh tokens are
//! signed with distinct secrets, so a token of one kind never verifies as the
//! other. Revoked token ids are kept in memory until their natural expiry.
//!
//! ## Responses
//!
//! Every credential rejection (unknown user, wrong password, locked or
//! inactive account) is reported to HTTP clients with the same status and
//! body, so callers cannot enumerate accounts.

pub mod api;
pub mod auth;
pub mod cli;
pub mod rate_limit;
pub mod storage;
pub mod sweep;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
