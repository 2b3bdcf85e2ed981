//! Per-caller request rate limiting for the public API.
//!
//! Reads and mutations draw from separate per-caller buckets so a burst of
//! list queries cannot starve writes, and vice versa.

use std::net::SocketAddr;
use std::num::NonZeroU32;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::AppState;
use crate::error::ApiError;

/// Requests-per-minute quotas, split between read and mutation paths.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub reads_per_minute: u32,
    pub writes_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            reads_per_minute: 60,
            writes_per_minute: 10,
        }
    }
}

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keyed limiters shared across requests; each caller gets an independent
/// token bucket per path class.
pub struct ApiRateLimiter {
    reads: KeyedLimiter,
    writes: KeyedLimiter,
}

impl ApiRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            reads: RateLimiter::keyed(quota(config.reads_per_minute)),
            writes: RateLimiter::keyed(quota(config.writes_per_minute)),
        }
    }

    /// Check one request against the caller's bucket; true when allowed.
    pub fn allow(&self, key: &str, mutating: bool) -> bool {
        let limiter = if mutating { &self.writes } else { &self.reads };
        limiter.check_key(&key.to_string()).is_ok()
    }
}

fn quota(per_minute: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN))
}

/// Middleware enforcing the per-caller quotas. GET/HEAD draw from the read
/// bucket, everything else from the mutation bucket.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = caller_key(&request);
    let method = request.method();
    let mutating = method != Method::GET && method != Method::HEAD;

    if !state.limiter.allow(&key, mutating) {
        tracing::warn!(caller = %key, mutating, "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}

/// Caller identity: the first `X-Forwarded-For` hop when present, otherwise
/// the peer address.
fn caller_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_exhaust_independently() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            reads_per_minute: 2,
            writes_per_minute: 1,
        });

        assert!(limiter.allow("10.0.0.1", false));
        assert!(limiter.allow("10.0.0.1", false));
        assert!(!limiter.allow("10.0.0.1", false));

        // The mutation bucket for the same caller is untouched.
        assert!(limiter.allow("10.0.0.1", true));
        assert!(!limiter.allow("10.0.0.1", true));
    }

    #[test]
    fn callers_are_isolated() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            reads_per_minute: 1,
            writes_per_minute: 1,
        });

        assert!(limiter.allow("10.0.0.1", false));
        assert!(!limiter.allow("10.0.0.1", false));
        assert!(limiter.allow("10.0.0.2", false));
    }

    #[test]
    fn zero_quota_config_still_admits_one() {
        // NonZero fallback keeps a misconfigured limiter from panicking.
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            reads_per_minute: 0,
            writes_per_minute: 0,
        });
        assert!(limiter.allow("10.0.0.1", false));
        assert!(!limiter.allow("10.0.0.1", false));
    }
}
