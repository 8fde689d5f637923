//! Authentication and account-security core.
//!
//! - `token`: HS256 access/refresh tokens with per-kind secrets
//! - `revocation`: revoked token ids, held until their natural expiry
//! - `ledger` + `lockout`: failed-attempt counters and the escalating lock
//! - `status`: account lifecycle guard
//! - `service`: the login/refresh/logout orchestration
//!
//! Shared state (revocations, stores) is constructed by the caller and passed
//! in; nothing here is a process-wide singleton.

pub mod error;
pub mod ledger;
pub mod lockout;
pub mod password;
pub mod revocation;
pub mod service;
pub mod state;
pub mod status;
pub mod token;

pub use error::{AuthError, ErrorCode};
pub use ledger::LoginAttemptLedger;
pub use lockout::{compute_delay, step_delay, LockoutPolicy, LOCK_REASON};
pub use password::{hash_password, verify_password};
pub use revocation::RevocationRegistry;
pub use service::{Authenticator, Deadline, Session};
pub use state::AuthConfig;
pub use status::check_status;
pub use token::{Claims, TokenIssuer, TokenKind, TokenPair};
