//! Per-host robots.txt fetch, parse, and policy lookup, memoized for
//! the lifetime of a Job. A fetch failure
//! is cached as "allow all" (fail-open) with the reason recorded so
//! callers can distinguish it from an explicit allow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_ROBOTS_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
enum CachedPolicy {
    Parsed(Arc<Robot>),
    /// Fetch failed; fail open. Reason kept for diagnostics.
    AllowAllFailOpen(String),
}

/// Per-Job memoizing robots.txt cache.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    entries: Mutex<HashMap<String, CachedPolicy>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            timeout: Duration::from_secs(DEFAULT_ROBOTS_TIMEOUT_SECS),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch-delay override for `host`, if its robots.txt sets one and
    /// it is at least the configured default.
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        let host = host_key(url)?;
        self.ensure_cached(url).await;
        let entries = self.entries.lock().await;
        match entries.get(&host) {
            Some(CachedPolicy::Parsed(robot)) => robot.delay.map(|d| Duration::from_secs_f32(d)),
            _ => None,
        }
    }

    /// Whether `user_agent` may fetch `url`, per the host's robots.txt.
    /// Fail-open on any fetch/parse error.
    pub async fn allowed(&self, url: &Url) -> bool {
        let Some(host) = host_key(url) else {
            return true;
        };
        self.ensure_cached(url).await;
        let entries = self.entries.lock().await;
        match entries.get(&host) {
            Some(CachedPolicy::Parsed(robot)) => robot.allowed(url.as_str()),
            Some(CachedPolicy::AllowAllFailOpen(_)) | None => true,
        }
    }

    async fn ensure_cached(&self, url: &Url) {
        let Some(host) = host_key(url) else {
            return;
        };
        {
            let entries = self.entries.lock().await;
            if entries.contains_key(&host) {
                return;
            }
        }

        let policy = self.fetch_and_parse(url).await;
        let mut entries = self.entries.lock().await;
        entries.entry(host).or_insert(policy);
    }

    async fn fetch_and_parse(&self, url: &Url) -> CachedPolicy {
        let robots_url = match robots_txt_url(url) {
            Some(u) => u,
            None => return CachedPolicy::AllowAllFailOpen("invalid host".to_string()),
        };

        let response = match self
            .client
            .get(robots_url.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt fetch failed, failing open");
                return CachedPolicy::AllowAllFailOpen(e.to_string());
            }
        };

        if !response.status().is_success() {
            debug!(url = %robots_url, status = %response.status(), "robots.txt not found, failing open");
            return CachedPolicy::AllowAllFailOpen(format!("http {}", response.status()));
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt body read failed, failing open");
                return CachedPolicy::AllowAllFailOpen(e.to_string());
            }
        };

        match Robot::new(&self.user_agent, &bytes) {
            Ok(robot) => CachedPolicy::Parsed(Arc::new(robot)),
            Err(e) => {
                warn!(url = %robots_url, error = ?e, "robots.txt parse failed, failing open");
                CachedPolicy::AllowAllFailOpen(format!("{e:?}"))
            }
        }
    }
}

fn host_key(url: &Url) -> Option<String> {
    Some(format!("{}://{}", url.scheme(), url.host_str()?))
}

fn robots_txt_url(url: &Url) -> Option<Url> {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    Some(robots)
}
