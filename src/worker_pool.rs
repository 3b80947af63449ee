//! A fixed-size pool of workers pulling from the Frontier, driving
//! Robots/RateLimiter/Fetcher/Extractor, and feeding the Progress Bus.
//! Termination uses an active-worker counter so "drained" never races
//! a peer mid-admission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tracing::debug;
use url::Url;

use crate::core::error::{Failure, FailureType};
use crate::core::types::{
    CrawlMode, PageCategory, PageResult, PageStatus, SkipReason, Timing,
};
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::frontier::{AdmitOutcome, Frontier, FrontierEntry};
use crate::progress::ProgressBus;
use crate::rate_limiter::RateLimiter;
use crate::robots::RobotsCache;
use crate::url_scope::ScopePolicy;

const POLL_FALLBACK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub max_depth: usize,
    pub mode: CrawlMode,
    pub include_child_pages: bool,
}

/// Shared state a Job's Worker Pool drives every page through.
pub struct WorkerPool {
    pub frontier: Arc<Frontier>,
    pub policy: Arc<ScopePolicy>,
    pub robots: Arc<RobotsCache>,
    pub rate_limiter: RateLimiter,
    pub fetcher: Arc<Fetcher>,
    pub extractor: Arc<Extractor>,
    pub bus: ProgressBus,
    pub config: WorkerPoolConfig,
    push_notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    pub results: Arc<Mutex<Vec<PageResult>>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontier: Arc<Frontier>,
        policy: Arc<ScopePolicy>,
        robots: Arc<RobotsCache>,
        rate_limiter: RateLimiter,
        fetcher: Arc<Fetcher>,
        extractor: Arc<Extractor>,
        bus: ProgressBus,
        config: WorkerPoolConfig,
        push_notify: Arc<Notify>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            frontier,
            policy,
            robots,
            rate_limiter,
            fetcher,
            extractor,
            bus,
            config,
            push_notify,
            cancelled,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run every worker to completion (the Frontier drains or
    /// cancellation is observed). Returns when the pool is done.
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::with_capacity(self.config.worker_count);
        for _ in 0..self.config.worker_count {
            let pool = Arc::clone(&self);
            handles.push(tokio::spawn(async move { pool.worker_loop().await }));
        }
        for h in handles {
            let _ = h.await;
        }
    }

    async fn worker_loop(&self) {
        loop {
            let Some(entry) = self.next_entry().await else {
                return;
            };
            self.process(entry).await;
            self.frontier.finish().await;
        }
    }

    /// Pop the next Frontier entry, or `None` once the pool is
    /// drained: Frontier empty AND no worker mid-admission. `pop` marks
    /// the entry active in the same critical section it is removed
    /// from the queue in, so `is_drained` here can never observe a
    /// false "queue empty, nothing active" window while a peer is
    /// between popping and admitting that entry's children.
    async fn next_entry(&self) -> Option<FrontierEntry> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(entry) = self.frontier.pop().await {
                return Some(entry);
            }
            if self.frontier.is_drained().await {
                return None;
            }
            tokio::select! {
                _ = self.push_notify.notified() => {}
                _ = tokio::time::sleep(POLL_FALLBACK_INTERVAL) => {}
            }
        }
    }

    async fn process(&self, entry: FrontierEntry) {
        debug_assert!(entry.depth <= self.config.max_depth);

        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }

        if !self.robots.allowed(&entry.url).await {
            self.record(
                &entry,
                None,
                0,
                Timing::default(),
                Failure::crawl(FailureType::RobotsBlocked, None, "disallowed by robots.txt"),
            )
            .await;
            return;
        }

        let host = entry.url.host_str().unwrap_or("").to_string();
        self.rate_limiter.acquire(&host).await;

        if let Some(delay) = self.robots.crawl_delay(&entry.url).await {
            self.rate_limiter.apply_robots_crawl_delay(&host, delay).await;
        }

        let limiter = self.rate_limiter.clone();
        let host_for_throttle = host.clone();
        let fetch_result = self
            .fetcher
            .fetch(&entry.url, || {
                let limiter = limiter.clone();
                let host = host_for_throttle.clone();
                async move { limiter.report_throttled(&host).await }
            })
            .await;

        let fetched = match fetch_result {
            Ok(page) => page,
            Err(fetch_err) => {
                let elapsed_ms = fetch_err.elapsed.as_millis() as u64;
                let timing = Timing {
                    total_ms: elapsed_ms,
                    crawl_ms: 0,
                    scrape_ms: 0,
                    time_before_failure_ms: elapsed_ms,
                };
                self.record(&entry, None, 0, timing, fetch_err.failure)
                    .await;
                return;
            }
        };

        self.rate_limiter.report_success(&host).await;
        let crawl_ms = fetched.elapsed.as_millis() as u64;

        if self.config.mode == CrawlMode::OnlyCrawl {
            let scrape_start = Instant::now();
            let links = self
                .extractor
                .extract_links(&fetched.bytes, &fetched.final_url);
            let scrape_ms = scrape_start.elapsed().as_millis() as u64;
            let timing = Timing {
                total_ms: crawl_ms + scrape_ms,
                crawl_ms,
                scrape_ms,
                time_before_failure_ms: 0,
            };
            self.finish_success(
                &entry,
                links.title,
                links.anchors,
                links.links_found,
                String::new(),
                0,
                false,
                timing,
                PageStatus::Crawled,
            )
            .await;
            return;
        }

        let scrape_start = Instant::now();
        let extracted = self.extractor.extract(&fetched.bytes, &fetched.final_url);
        let scrape_ms = scrape_start.elapsed().as_millis() as u64;

        match extracted {
            Ok(extracted) => {
                let timing = Timing {
                    total_ms: crawl_ms + scrape_ms,
                    crawl_ms,
                    scrape_ms,
                    time_before_failure_ms: 0,
                };
                self.finish_success(
                    &entry,
                    extracted.title,
                    extracted.anchors,
                    extracted.links_found,
                    extracted.content,
                    extracted.content_chars,
                    extracted.truncated,
                    timing,
                    PageStatus::Scraped,
                )
                .await;
            }
            Err(failure) => {
                let timing = Timing {
                    total_ms: crawl_ms + scrape_ms,
                    crawl_ms,
                    scrape_ms: 0,
                    time_before_failure_ms: crawl_ms + scrape_ms,
                };
                self.record(&entry, None, 0, timing, failure).await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_success(
        &self,
        entry: &FrontierEntry,
        title: Option<String>,
        anchors: Vec<Url>,
        links_found: usize,
        content: String,
        content_chars: usize,
        truncated: bool,
        timing: Timing,
        status: PageStatus,
    ) {
        if self.config.include_child_pages
            && self.config.mode != CrawlMode::OnlyScrape
            && entry.depth + 1 <= self.config.max_depth
        {
            for anchor in &anchors {
                let outcome = self
                    .frontier
                    .try_admit(anchor.as_str(), entry.depth + 1, Some(&entry.url), &self.policy)
                    .await;
                if outcome == AdmitOutcome::Admitted {
                    self.push_notify.notify_one();
                }
            }
        }

        self.record_with(
            entry,
            title,
            links_found,
            content,
            content_chars,
            truncated,
            timing,
            Failure::none(),
            status,
        )
        .await;
    }

    async fn record(
        &self,
        entry: &FrontierEntry,
        title: Option<String>,
        links_found: usize,
        timing: Timing,
        failure: Failure,
    ) {
        self.record_with(
            entry,
            title,
            links_found,
            String::new(),
            0,
            false,
            timing,
            failure,
            PageStatus::Error,
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_with(
        &self,
        entry: &FrontierEntry,
        title: Option<String>,
        links_found: usize,
        content: String,
        content_chars: usize,
        truncated: bool,
        timing: Timing,
        failure: Failure,
        status: PageStatus,
    ) {
        let is_same_domain = self.policy.is_same_domain(&entry.url);
        let is_subdomain = self.policy.is_subdomain(&entry.url);
        let category = if failure.is_present() {
            PageCategory::Error
        } else if is_same_domain || is_subdomain {
            PageCategory::SameDomainSuccess
        } else {
            PageCategory::ExternalDomain
        };

        let has_content = !content.is_empty();
        let status = if failure.is_present() {
            PageStatus::Error
        } else {
            status
        };

        let result = PageResult {
            url: entry.url.to_string(),
            parent_url: entry.parent.as_ref().map(|u| u.to_string()),
            depth: entry.depth,
            title,
            links_found,
            status,
            has_content,
            content,
            content_chars,
            truncated,
            timing,
            failure,
            is_same_domain,
            is_subdomain,
            category,
            skip_reason: SkipReason::None,
        };

        debug!(url = %result.url, status = ?result.status, depth = result.depth, "page processed");
        self.results.lock().await.push(result.clone());
        self.bus.publish_page_complete(result).await;
    }
}
