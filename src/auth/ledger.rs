//! Login-attempt ledger: durable per-`(username, origin)` counters.
//!
//! Thin layer over a [`LoginAttemptStore`] that translates storage errors into
//! the auth taxonomy. Atomicity of the increment is the store's contract.

use std::sync::Arc;

use crate::storage::{AttemptSnapshot, LoginAttemptStore};

use super::error::AuthError;

#[derive(Clone)]
pub struct LoginAttemptLedger {
    store: Arc<dyn LoginAttemptStore>,
}

impl LoginAttemptLedger {
    #[must_use]
    pub fn new(store: Arc<dyn LoginAttemptStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// `StorageFailure` if the increment could not be persisted.
    pub async fn record_attempt(
        &self,
        username: &str,
        origin: &str,
        success: bool,
    ) -> Result<(), AuthError> {
        self.store
            .record_attempt(username, origin, success)
            .await
            .map_err(|err| AuthError::storage(&err))
    }

    /// # Errors
    /// `StorageFailure` if the counter could not be reset.
    pub async fn reset(&self, username: &str, origin: &str) -> Result<(), AuthError> {
        self.store
            .reset(username, origin)
            .await
            .map_err(|err| AuthError::storage(&err))
    }

    /// Clear the counters of every origin for `username`.
    ///
    /// # Errors
    /// `StorageFailure` if the counters could not be reset.
    pub async fn reset_all(&self, username: &str) -> Result<u64, AuthError> {
        self.store
            .reset_all(username)
            .await
            .map_err(|err| AuthError::storage(&err))
    }

    /// # Errors
    /// `StorageFailure` if the counter could not be read.
    pub async fn get_attempts(
        &self,
        username: &str,
        origin: &str,
    ) -> Result<AttemptSnapshot, AuthError> {
        self.store
            .get_attempts(username, origin)
            .await
            .map_err(|err| AuthError::storage(&err))
    }
}

impl std::fmt::Debug for LoginAttemptLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttemptLedger").finish_non_exhaustive()
    }
}
