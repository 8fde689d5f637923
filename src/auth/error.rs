//! Tagged error taxonomy for the authentication core.
//!
//! Callers dispatch on [`AuthError::code`] rather than on the variant shape. At
//! the HTTP boundary every credential rejection collapses into one generic
//! response so the outcome never reveals whether an account exists, is locked,
//! or which part of a token failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;

const GENERIC_REJECTION: &str = "invalid credentials";
const GENERIC_INTERNAL: &str = "internal server error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidCredentials,
    UserLocked,
    UserInactive,
    TokenExpired,
    TokenRevoked,
    TokenMalformed,
    TokenWrongKind,
    SigningFailure,
    RateLimitExceeded,
    DatabaseError,
    Canceled,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserLocked => "USER_LOCKED",
            Self::UserInactive => "USER_INACTIVE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenWrongKind => "TOKEN_WRONG_KIND",
            Self::SigningFailure => "SIGNING_FAILURE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::Canceled => "CANCELED_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked until {until}: {reason}")]
    AccountLocked {
        until: DateTime<Utc>,
        reason: String,
    },
    #[error("account is not active")]
    AccountInactive,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token malformed")]
    TokenMalformed,
    #[error("token kind does not match")]
    TokenWrongKind,
    #[error("token signing failed: {0}")]
    SigningFailure(String),
    #[error("rate limited")]
    RateLimited,
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("deadline exceeded before the operation started")]
    Cancelled,
}

impl AuthError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::AccountLocked { .. } => ErrorCode::UserLocked,
            Self::AccountInactive => ErrorCode::UserInactive,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::TokenRevoked => ErrorCode::TokenRevoked,
            Self::TokenMalformed => ErrorCode::TokenMalformed,
            Self::TokenWrongKind => ErrorCode::TokenWrongKind,
            Self::SigningFailure(_) => ErrorCode::SigningFailure,
            Self::RateLimited => ErrorCode::RateLimitExceeded,
            Self::StorageFailure(_) => ErrorCode::DatabaseError,
            Self::Cancelled => ErrorCode::Canceled,
        }
    }

    /// Credential, account-state and token rejections: everything the client
    /// must not be able to tell apart.
    #[must_use]
    pub const fn is_credential_rejection(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidCredentials
                | ErrorCode::UserLocked
                | ErrorCode::UserInactive
                | ErrorCode::TokenExpired
                | ErrorCode::TokenRevoked
                | ErrorCode::TokenMalformed
                | ErrorCode::TokenWrongKind
        )
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SigningFailure | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub(crate) fn storage(err: &anyhow::Error) -> Self {
        Self::StorageFailure(format!("{err:#}"))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.code() {
            ErrorCode::RateLimitExceeded | ErrorCode::Canceled => status.into_response(),
            ErrorCode::SigningFailure | ErrorCode::DatabaseError => {
                error!(code = %self.code(), "{self}");
                (status, Json(json!({ "error": GENERIC_INTERNAL }))).into_response()
            }
            _ => (status, Json(json!({ "error": GENERIC_REJECTION }))).into_response(),
        }
    }
}
