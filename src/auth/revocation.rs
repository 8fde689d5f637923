//! In-process registry of revoked token ids.
//!
//! An id stays registered until the token's own expiry; after that the token
//! would be rejected as expired anyway, so the entry is dropped lazily on the
//! next lookup or by [`RevocationRegistry::purge_expired`] from the sweeper.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RevocationRegistry {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token_id` as revoked until `expires_at`.
    pub fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(token_id.to_string(), expires_at);
    }

    #[must_use]
    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.is_revoked_at(token_id, Utc::now())
    }

    /// Lookup that discards the entry if its expiry has already passed.
    #[must_use]
    pub fn is_revoked_at(&self, token_id: &str, now: DateTime<Utc>) -> bool {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(token_id) {
                None => return false,
                Some(expires_at) if *expires_at > now => return true,
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent revoke may have
        // refreshed the entry in between.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(token_id) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                entries.remove(token_id);
                false
            }
            None => false,
        }
    }

    /// Drop every entry whose expiry has passed, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
