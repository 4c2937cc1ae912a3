//! Admission policy applied to every request before authorization.

use super::{client_origin, handlers::ErrorBody};
use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

pub const DEFAULT_LIMIT: u32 = 60;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub const TOO_MANY_REQUESTS: &str = "Too many requests, please try again later";

/// Expired windows are pruned once the map grows past this many clients.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, client: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// At most `limit` requests per client within each `window`.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    clients: DashMap<String, Window>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: DashMap::new(),
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitDecision {
        if self.clients.len() >= PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let elapsed = now.saturating_duration_since(entry.started);
            return RateLimitDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateLimitDecision::Allowed
    }

    fn prune(&self, now: Instant) {
        self.clients
            .retain(|_, window| now.saturating_duration_since(window.started) < self.window);
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, client: &str) -> RateLimitDecision {
        self.check_at(client, Instant::now())
    }
}

/// Middleware: reject with 429 and `Retry-After` once the client's window is used up.
pub async fn enforce(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_origin(&request);

    match limiter.check(&client) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            warn!("Rate limit exceeded for {}", client);

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new(TOO_MANY_REQUESTS)),
            )
                .into_response();

            // Retry-After is whole seconds, never zero while limited
            let seconds = retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));

            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        assert_eq!(NoopRateLimiter.check("1.2.3.4"), RateLimitDecision::Allowed);
    }

    #[test]
    fn limits_after_threshold() {
        let limiter = FixedWindowRateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at("1.2.3.4", now), RateLimitDecision::Allowed);
        }

        let later = now + Duration::from_secs(20);
        assert_eq!(
            limiter.check_at("1.2.3.4", later),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
    }

    #[test]
    fn clients_are_independent() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at("a", now), RateLimitDecision::Allowed);
        assert_ne!(limiter.check_at("a", now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at("b", now), RateLimitDecision::Allowed);
    }

    #[test]
    fn window_resets() {
        let limiter = FixedWindowRateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at("a", now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at("a", now), RateLimitDecision::Allowed);
        assert_ne!(limiter.check_at("a", now), RateLimitDecision::Allowed);

        let next_window = now + Duration::from_secs(60);
        assert_eq!(limiter.check_at("a", next_window), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at("a", next_window), RateLimitDecision::Allowed);
        assert_ne!(limiter.check_at("a", next_window), RateLimitDecision::Allowed);
    }

    #[test]
    fn prune_drops_expired_windows() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_secs(1));
        let now = Instant::now();
        limiter.check_at("old", now);
        limiter.prune(now + Duration::from_secs(2));
        assert!(limiter.clients.is_empty());
    }

    #[test]
    fn defaults() {
        let limiter = FixedWindowRateLimiter::default();
        assert_eq!(limiter.limit(), 60);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }
}
