//! Per-host minimum inter-request interval with adaptive back-off on
//! 429/503. Shared across every Job run by a `MultiScopeScheduler` —
//! polite crawling is a property of the target host, not the scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tokio::time::sleep;

const DECAY_FACTOR: f64 = 0.9;

/// Small fixed user-agent pool; one is chosen per request to reduce
/// trivial fingerprinting.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) routewarden/0.1",
    "Mozilla/5.0 (X11; Linux x86_64) routewarden/0.1",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) routewarden/0.1",
];

struct HostState {
    last_request_time: Option<Instant>,
    current_delay: Duration,
}

/// Per-host adaptive rate limiter, clonable (wraps an `Arc`) so it can
/// be shared across Jobs in a `MultiScopeScheduler`.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, HostState>>>,
    default_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    pub fn new(default_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            default_delay,
            max_delay,
        }
    }

    /// Suspend until at least `current_delay` has elapsed since the
    /// last request to `host`, then record `now` as the new last
    /// request time.
    pub async fn acquire(&self, host: &str) {
        let wait = {
            let mut states = self.inner.lock().await;
            let state = states.entry(host.to_string()).or_insert_with(|| HostState {
                last_request_time: None,
                current_delay: self.default_delay,
            });
            let now = Instant::now();
            let wait = match state.last_request_time {
                Some(last) => {
                    let elapsed = now.saturating_duration_since(last);
                    state.current_delay.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            state.last_request_time = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Report a 429/503 response: double `current_delay`, capped at `max_delay`.
    pub async fn report_throttled(&self, host: &str) {
        let mut states = self.inner.lock().await;
        let state = states.entry(host.to_string()).or_insert_with(|| HostState {
            last_request_time: None,
            current_delay: self.default_delay,
        });
        let doubled = state.current_delay.mul_f64(2.0);
        state.current_delay = doubled.min(self.max_delay);
    }

    /// Report a success: decay `current_delay` toward `default_delay`
    /// by a multiplicative factor.
    pub async fn report_success(&self, host: &str) {
        let mut states = self.inner.lock().await;
        if let Some(state) = states.get_mut(host) {
            let decayed = state.current_delay.mul_f64(DECAY_FACTOR);
            state.current_delay = decayed.max(self.default_delay);
        }
    }

    /// Set the host's minimum interval from robots.txt `Crawl-delay`,
    /// when it is at least the configured default.
    pub async fn apply_robots_crawl_delay(&self, host: &str, crawl_delay: Duration) {
        if crawl_delay < self.default_delay {
            return;
        }
        let mut states = self.inner.lock().await;
        let state = states.entry(host.to_string()).or_insert_with(|| HostState {
            last_request_time: None,
            current_delay: self.default_delay,
        });
        state.current_delay = state.current_delay.max(crawl_delay);
    }

    #[cfg(test)]
    async fn current_delay(&self, host: &str) -> Duration {
        let states = self.inner.lock().await;
        states
            .get(host)
            .map(|s| s.current_delay)
            .unwrap_or(self.default_delay)
    }
}

/// Pick a user agent from the fixed rotation pool.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
