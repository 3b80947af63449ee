use serde::{Deserialize, Serialize};

use super::error::Failure;

/// Crawl mode — a tagged variant dispatched in the worker loop rather
/// than expressed through inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Fetch and follow links, but do not retain page content.
    OnlyCrawl,
    /// Fetch the seed only; extract content, do not enqueue children.
    OnlyScrape,
    /// Fetch, extract content and links, enqueue children (default).
    CrawlScrape,
}

impl Default for CrawlMode {
    fn default() -> Self {
        CrawlMode::CrawlScrape
    }
}

/// Final status of a processed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Scraped,
    Crawled,
    Skipped,
    Error,
}

/// Why a page was recorded as `skipped`, when it is.
///
/// This crate never constructs a `Skipped` row itself; the variant is
/// kept so a caller-provided policy extension can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ChildPagesDisabled,
    None,
}

impl Default for SkipReason {
    fn default() -> Self {
        SkipReason::None
    }
}

/// Category a fetched URL falls into relative to the Job's primary
/// host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    SameDomainSuccess,
    ExternalDomain,
    Error,
}

/// Per-page timing breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub total_ms: u64,
    pub crawl_ms: u64,
    pub scrape_ms: u64,
    pub time_before_failure_ms: u64,
}

/// A heading extracted from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// The Job's primary output row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub parent_url: Option<String>,
    pub depth: usize,
    pub title: Option<String>,
    pub links_found: usize,
    pub status: PageStatus,
    pub has_content: bool,
    pub content: String,
    pub content_chars: usize,
    pub truncated: bool,
    pub timing: Timing,
    pub failure: Failure,
    pub is_same_domain: bool,
    pub is_subdomain: bool,
    pub category: PageCategory,
    pub skip_reason: SkipReason,
}

/// Per-depth rollup of visited URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthStats {
    pub depth: usize,
    pub urls: Vec<String>,
}

/// Lifecycle state of a `Job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate timing rollup for a Job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AggregateTiming {
    pub url_discovery_ms: u64,
    pub crawling_ms: u64,
    pub scraping_ms: u64,
    pub total_ms: u64,
}

impl AggregateTiming {
    fn pct(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn url_discovery_pct(&self) -> f64 {
        Self::pct(self.url_discovery_ms, self.total_ms)
    }

    pub fn crawling_pct(&self) -> f64 {
        Self::pct(self.crawling_ms, self.total_ms)
    }

    pub fn scraping_pct(&self) -> f64 {
        Self::pct(self.scraping_ms, self.total_ms)
    }
}

/// Observable snapshot of a Job's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub current_depth: usize,
    pub urls_discovered: usize,
    pub urls_processed: usize,
    pub urls_skipped_out_of_scope: usize,
    pub urls_by_depth: Vec<DepthStats>,
    pub timing: AggregateTiming,
    pub error: Option<String>,
}

/// The full result of a terminated Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub job_id: String,
    pub seed_urls: Vec<String>,
    pub snapshot: JobSnapshot,
    pub urls_by_depth: Vec<DepthStats>,
    pub unique_domains: Vec<String>,
    pub sitemap: Vec<String>,
    pub results: Vec<PageResult>,
}

/// Aggregated snapshot across every Job run by a `MultiScopeScheduler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiJobSnapshot {
    pub state: JobState,
    pub urls_discovered: usize,
    pub urls_processed: usize,
    pub per_job: Vec<JobSnapshot>,
    pub overlapping_scopes: Vec<(String, String)>,
}
