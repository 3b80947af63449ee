//! Single-URL HTTP GET with timeout and bounded redirects, returning
//! bytes + final URL + status + timing, or a classified `Failure`.
//! Retries transient failures with exponential back-off and jitter.

use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tracing::debug;
use url::Url;

use crate::core::{Failure, FailureType};
use crate::rate_limiter::random_user_agent;

const RETRY_BASE_SECS: f64 = 0.5;
const RETRY_MULTIPLIER: f64 = 2.0;
const RETRY_JITTER: f64 = 0.2;

/// A successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub bytes: Vec<u8>,
    pub final_url: Url,
    pub http_status: u16,
    pub elapsed: Duration,
}

/// A fetch that gave up: the classified failure plus how long the
/// attempt (including any retries) ran before giving up, so the
/// caller can set `PageResult.timing.time_before_failure_ms`.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub failure: Failure,
    pub elapsed: Duration,
}

pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl Fetcher {
    pub fn new(request_timeout: Duration, connection_pool_size: usize, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(connection_pool_size)
            .build()
            .expect("failed to build HTTP client");
        Self { client, max_retries }
    }

    pub fn with_client(client: reqwest::Client, max_retries: u32) -> Self {
        Self { client, max_retries }
    }

    /// Fetch `url`, retrying transient failures up to `max_retries`
    /// times with exponential back-off.
    ///
    /// `on_throttle` is invoked whenever a 429/503 is observed so the
    /// caller's rate limiter can back off before the next attempt.
    pub async fn fetch<F, Fut>(
        &self,
        url: &Url,
        mut on_throttle: F,
    ) -> Result<FetchedPage, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let start = Instant::now();
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs_f64(RETRY_BASE_SECS))
            .with_multiplier(RETRY_MULTIPLIER)
            .with_randomization_factor(RETRY_JITTER)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        loop {
            let result = self.fetch_once(url).await;
            match result {
                Ok(page) => return Ok(page),
                Err(failure) => {
                    let is_429 = failure.http_status == Some(429);
                    if is_429 || matches!(failure.http_status, Some(503)) {
                        on_throttle().await;
                    }
                    let retryable = failure.failure_type.is_retryable() || is_429;
                    if !retryable || attempt >= self.max_retries {
                        let elapsed = start.elapsed();
                        let mut failure = failure;
                        failure.reason = Some(format!(
                            "{} (attempt {}/{}, elapsed {:?})",
                            failure.reason.unwrap_or_default(),
                            attempt + 1,
                            self.max_retries + 1,
                            elapsed
                        ));
                        return Err(FetchError { failure, elapsed });
                    }
                    let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(1));
                    debug!(url = %url, attempt, ?delay, "retrying fetch after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, Failure> {
        let start = Instant::now();
        let user_agent = random_user_agent();
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", user_agent)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if status.as_u16() >= 400 {
            let failure_type = if status.as_u16() < 500 {
                FailureType::Http4xx
            } else {
                FailureType::Http5xx
            };
            return Err(Failure::crawl(
                failure_type,
                Some(status.as_u16()),
                format!("http status {}", status.as_u16()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_request_error(&e))?
            .to_vec();

        Ok(FetchedPage {
            bytes,
            final_url,
            http_status: status.as_u16(),
            elapsed: start.elapsed(),
        })
    }
}

fn classify_request_error(e: &reqwest::Error) -> Failure {
    if e.is_timeout() {
        return Failure::crawl(FailureType::Timeout, None, e.to_string());
    }
    if e.is_redirect() {
        return Failure::crawl(FailureType::RedirectLoop, None, e.to_string());
    }
    let msg = e.to_string().to_ascii_lowercase();
    if msg.contains("dns") || msg.contains("resolve") || msg.contains("name not found") {
        return Failure::crawl(FailureType::DnsError, None, e.to_string());
    }
    if msg.contains("certificate") || msg.contains("tls") || msg.contains("ssl") {
        return Failure::crawl(FailureType::SslError, None, e.to_string());
    }
    if e.is_connect() || msg.contains("connection") || msg.contains("refused") || msg.contains("reset") {
        return Failure::crawl(FailureType::ConnectionError, None, e.to_string());
    }
    Failure::crawl(FailureType::Unknown, None, e.to_string())
}
