//! Periodic maintenance of process-local registries and persisted locks.
//!
//! Revocations and rate-limit buckets expire lazily and the status guard
//! ignores elapsed locks, so those sweeps only bound memory and rewrite stale
//! `locked` rows. Idle-account deactivation happens nowhere else.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{auth::RevocationRegistry, rate_limit::ClientRateLimiter, storage::AccountStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub revocations_purged: usize,
    pub buckets_swept: usize,
    pub locks_released: u64,
    pub accounts_deactivated: u64,
}

#[derive(Clone)]
pub struct Sweeper {
    revocations: Arc<RevocationRegistry>,
    limiter: Arc<ClientRateLimiter>,
    accounts: Arc<dyn AccountStore>,
    interval: Duration,
    idle_window: Duration,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        revocations: Arc<RevocationRegistry>,
        limiter: Arc<ClientRateLimiter>,
        accounts: Arc<dyn AccountStore>,
        interval: Duration,
        idle_window: Duration,
    ) -> Self {
        Self {
            revocations,
            limiter,
            accounts,
            interval: interval.max(Duration::from_secs(1)),
            idle_window,
        }
    }

    /// One maintenance cycle. Storage errors are logged and the in-memory
    /// sweeps still run.
    pub async fn run_once(&self) -> SweepReport {
        let now = Utc::now();
        let revocations_purged = self.revocations.purge_expired();
        let buckets_swept = self.limiter.sweep_idle();
        let locks_released = match self.accounts.release_expired_locks(now).await {
            Ok(released) => released,
            Err(err) => {
                error!("failed to release expired account locks: {err:#}");
                0
            }
        };

        let accounts_deactivated = match self.idle_cutoff(now) {
            Some(cutoff) => match self.accounts.deactivate_idle(cutoff).await {
                Ok(deactivated) => {
                    if deactivated > 0 {
                        info!(deactivated, %cutoff, "deactivated idle accounts");
                    }
                    deactivated
                }
                Err(err) => {
                    error!("failed to deactivate idle accounts: {err:#}");
                    0
                }
            },
            None => 0,
        };

        SweepReport {
            revocations_purged,
            buckets_swept,
            locks_released,
            accounts_deactivated,
        }
    }

    fn idle_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.idle_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
    }

    /// Run cycles every `interval` until `shutdown` flips to true or its
    /// sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        debug!(
                            revocations_purged = report.revocations_purged,
                            buckets_swept = report.buckets_swept,
                            locks_released = report.locks_released,
                            accounts_deactivated = report.accounts_deactivated,
                            "sweep cycle finished"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("interval", &self.interval)
            .field("idle_window", &self.idle_window)
            .finish_non_exhaustive()
    }
}
