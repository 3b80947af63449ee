use serde::{Deserialize, Serialize};

/// The phase of the page lifecycle a failure occurred in.
///
/// A crawl failure happens during network fetch or the robots check;
/// a scrape failure happens during content extraction after a
/// successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Crawl,
    Scrape,
    None,
}

/// Exhaustive per-page failure taxonomy covering both the crawl and
/// scrape phases.
///
/// This is data, not an exception: it flows into `PageResult::failure`
/// and never aborts the owning `Job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    #[error("request timed out")]
    Timeout,
    #[error("dns resolution failed")]
    DnsError,
    #[error("tls handshake or certificate verification failed")]
    SslError,
    #[error("tcp connection refused or reset")]
    ConnectionError,
    #[error("redirect budget exhausted")]
    RedirectLoop,
    #[error("http client error response")]
    Http4xx,
    #[error("http server error response")]
    Http5xx,
    #[error("disallowed by robots.txt")]
    RobotsBlocked,
    #[error("html could not be parsed")]
    ParseError,
    #[error("no content selector matched")]
    SelectorMismatch,
    #[error("extraction produced no content")]
    EmptyContent,
    #[error("unclassified failure")]
    Unknown,
}

impl FailureType {
    /// Whether a caller should retry after this failure.
    ///
    /// `Http4xx` is retryable only for 429, which callers check via
    /// the accompanying `http_status` before calling this.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureType::Timeout | FailureType::ConnectionError | FailureType::Http5xx
        )
    }
}

/// A recorded per-page failure: phase, type, and optional detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub phase: FailurePhase,
    pub failure_type: FailureType,
    pub reason: Option<String>,
    pub http_status: Option<u16>,
}

impl Failure {
    pub fn none() -> Self {
        Self {
            phase: FailurePhase::None,
            failure_type: FailureType::Unknown,
            reason: None,
            http_status: None,
        }
    }

    pub fn crawl(failure_type: FailureType, http_status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            phase: FailurePhase::Crawl,
            failure_type,
            reason: Some(reason.into()),
            http_status,
        }
    }

    pub fn scrape(failure_type: FailureType, reason: impl Into<String>) -> Self {
        Self {
            phase: FailurePhase::Scrape,
            failure_type,
            reason: Some(reason.into()),
            http_status: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.phase != FailurePhase::None
    }
}

/// Job-fatal errors: internal invariant violations or invalid input
/// that abort the whole `Job`, as distinct from per-page `Failure`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("no seed URL canonicalized successfully or satisfied the scope policy")]
    NoValidSeeds,
    #[error("scope '{0}' has no valid entry URL")]
    ScopeWithoutEntries(String),
    #[error("scope '{0}' has an empty name")]
    ScopeMissingName(String),
    #[error("worker_count must be in [{min}, {max}], got {got}")]
    WorkerCountOutOfRange { min: usize, max: usize, got: usize },
    #[error("max_depth must be in [{min}, {max}], got {got}")]
    MaxDepthOutOfRange { min: usize, max: usize, got: usize },
    #[error("parallel_kbs must be in [{min}, {max}], got {got}")]
    ParallelKbsOutOfRange { min: usize, max: usize, got: usize },
    #[error("internal lock was poisoned: {0}")]
    Poisoned(String),
    #[error("job is not in a state that allows this operation")]
    InvalidState,
}
