//! Per-client token-bucket rate limiting, applied in front of every route.
//!
//! Each client key gets a bucket of `capacity` credits that regains one credit
//! per `fill_interval`. Buckets are created lazily on first sight and dropped
//! by [`ClientRateLimiter::sweep_idle`] once they are full again.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, client_key: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client_key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    available: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            available: capacity,
            last_refill: now,
        }
    }

    /// Credit whole intervals elapsed since the last refill. Partial intervals
    /// carry over; a full bucket does not bank time.
    fn refill(&mut self, capacity: u32, fill_interval: Duration, now: Instant) {
        if self.available >= capacity {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = elapsed.as_nanos() / fill_interval.as_nanos();
        if intervals == 0 {
            return;
        }

        let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
        self.available = self
            .available
            .saturating_add(intervals)
            .min(capacity);
        if self.available == capacity {
            self.last_refill = now;
        } else {
            self.last_refill = fill_interval
                .checked_mul(intervals)
                .and_then(|advance| self.last_refill.checked_add(advance))
                .unwrap_or(now);
        }
    }
}

/// Registry of buckets keyed by client address.
#[derive(Debug)]
pub struct ClientRateLimiter {
    capacity: u32,
    fill_interval: Duration,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl ClientRateLimiter {
    #[must_use]
    pub fn new(capacity: u32, fill_interval: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            fill_interval: fill_interval.max(Duration::from_millis(1)),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn fill_interval(&self) -> Duration {
        self.fill_interval
    }

    /// Take one credit from the client's bucket, creating it if needed.
    #[must_use]
    pub fn take_token(&self, client_key: &str) -> bool {
        self.take_token_at(client_key, Instant::now())
    }

    pub(crate) fn take_token_at(&self, client_key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets
            .entry(client_key.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity, now));

        bucket.refill(self.capacity, self.fill_interval, now);
        if bucket.available == 0 {
            return false;
        }
        bucket.available -= 1;
        true
    }

    /// Drop buckets that have refilled to capacity. Returns how many went.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    pub(crate) fn sweep_idle_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket.refill(self.capacity, self.fill_interval, now);
            bucket.available < self.capacity
        });
        before - buckets.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RateLimiter for ClientRateLimiter {
    fn check(&self, client_key: &str) -> RateLimitDecision {
        if self.take_token(client_key) {
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }
}

/// First `X-Forwarded-For` entry, else the socket address' IP.
#[must_use]
pub fn client_key(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Client key as seen by the rate limiter, for handlers that need the origin.
#[must_use]
pub fn request_client_key(request: &Request) -> String {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_key(request.headers(), remote)
}

/// axum middleware: deny with a bare `429` when the client's bucket is empty.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request_client_key(&request);

    match limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited => {
            warn!(
                event = "rate_limit_triggered",
                client = %key,
                path = %request.uri().path(),
                "rate limit exceeded"
            );
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
    }
}
