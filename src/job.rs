//! Binds a seed set, scope policy, mode, and budget to one
//! Frontier/Robots/RateLimiter/Fetcher/Extractor/WorkerPool/
//! ProgressBus, and owns the lifecycle pending → running → terminal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::info;
use url::Url;

use crate::core::config::{clamp_max_depth, clamp_worker_count, EngineConfig};
use crate::core::error::JobError;
use crate::core::types::{
    AggregateTiming, CrawlMode, CrawlResult, DepthStats, JobSnapshot, JobState, PageCategory,
    PageResult,
};
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::frontier::Frontier;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::rate_limiter::RateLimiter;
use crate::robots::RobotsCache;
use crate::url_scope::{self, ScopePolicy};
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

const STATUS_TICK: Duration = Duration::from_millis(750);

/// Ingress request shape for starting a Job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub seed_urls: Vec<String>,
    pub mode: CrawlMode,
    pub max_depth: usize,
    pub worker_count: usize,
    pub allow_subdomains: bool,
    pub allowed_domains: Vec<String>,
    pub include_child_pages: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Path-prefix isolation for a scope run under a
    /// `MultiScopeScheduler`. Empty means "any path".
    pub allowed_path_prefixes: Vec<String>,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            seed_urls: Vec::new(),
            mode: CrawlMode::default(),
            max_depth: crate::core::config::MAX_DEPTH,
            worker_count: crate::core::config::MIN_WORKERS,
            allow_subdomains: false,
            allowed_domains: Vec::new(),
            include_child_pages: true,
            include_patterns: Vec::new(),
            exclude_patterns: ScopePolicy::default_excludes(),
            allowed_path_prefixes: Vec::new(),
        }
    }
}

pub struct Job {
    pub id: String,
    seed_urls: Vec<Url>,
    mode: CrawlMode,
    policy: Arc<ScopePolicy>,
    frontier: Arc<Frontier>,
    rate_limiter: RateLimiter,
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    robots: Arc<RobotsCache>,
    bus: ProgressBus,
    worker_pool_config: WorkerPoolConfig,
    worker_pool: Mutex<Option<Arc<WorkerPool>>>,
    push_notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    state: Mutex<JobState>,
    error: Mutex<Option<String>>,
    started_at: Mutex<Option<Instant>>,
    terminated_at: Mutex<Option<Instant>>,
    url_discovery_ms: AtomicU64,
}

impl Job {
    /// Validate and construct a pending Job, sharing `fetcher` and
    /// `rate_limiter` with any sibling Jobs under a Scheduler — rate
    /// limiter state is shared across all Jobs targeting the same host.
    pub fn new(
        id: impl Into<String>,
        spec: JobSpec,
        engine_config: &EngineConfig,
        fetcher: Arc<Fetcher>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, JobError> {
        let canonical_seeds: Vec<Url> = spec
            .seed_urls
            .iter()
            .filter_map(|raw| url_scope::canonicalize(raw, None))
            .collect();
        let Some(first) = canonical_seeds.first() else {
            return Err(JobError::NoValidSeeds);
        };
        let primary_host = first
            .host_str()
            .ok_or(JobError::NoValidSeeds)?
            .to_ascii_lowercase();

        let policy = ScopePolicy {
            primary_host,
            allow_subdomains: spec.allow_subdomains,
            additional_hosts: spec
                .allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            allowed_path_prefixes: spec.allowed_path_prefixes.clone(),
            include_child_pages: spec.include_child_pages,
            include_patterns: spec.include_patterns.clone(),
            exclude_patterns: spec.exclude_patterns.clone(),
        };

        let seed_urls: Vec<Url> = canonical_seeds
            .into_iter()
            .filter(|u| policy.admits(u))
            .collect();
        if seed_urls.is_empty() {
            return Err(JobError::NoValidSeeds);
        }

        let max_depth = clamp_max_depth(spec.max_depth);
        let worker_count = clamp_worker_count(spec.worker_count);

        let extractor = Arc::new(Extractor::new(
            engine_config.max_content_length,
            engine_config.max_headings,
        ));
        let robots = Arc::new(RobotsCache::new(reqwest::Client::new(), "routewarden-bot"));

        Ok(Self {
            id: id.into(),
            seed_urls,
            mode: spec.mode,
            policy: Arc::new(policy),
            frontier: Arc::new(Frontier::new(max_depth)),
            rate_limiter,
            fetcher,
            extractor,
            robots,
            bus: ProgressBus::new(),
            worker_pool_config: WorkerPoolConfig {
                worker_count,
                max_depth,
                mode: spec.mode,
                include_child_pages: spec.include_child_pages,
            },
            worker_pool: Mutex::new(None),
            push_notify: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(JobState::Pending),
            error: Mutex::new(None),
            started_at: Mutex::new(None),
            terminated_at: Mutex::new(None),
            url_discovery_ms: AtomicU64::new(0),
        })
    }

    /// pending → running: admit every seed exactly once, then spawn
    /// the Worker Pool and the periodic status-update/discovery
    /// watchers.
    pub async fn start(self: &Arc<Self>) -> Result<(), JobError> {
        {
            let mut state = self.state.lock().await;
            if *state != JobState::Pending {
                return Err(JobError::InvalidState);
            }
            *state = JobState::Running;
        }
        *self.started_at.lock().await = Some(Instant::now());
        info!(job_id = %self.id, seeds = self.seed_urls.len(), "job starting");

        for seed in &self.seed_urls {
            self.frontier.try_admit_seed(seed.clone(), &self.policy).await;
        }
        self.push_notify.notify_waiters();

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.frontier),
            Arc::clone(&self.policy),
            Arc::clone(&self.robots),
            self.rate_limiter.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            self.bus.clone(),
            self.worker_pool_config,
            Arc::clone(&self.push_notify),
            Arc::clone(&self.cancelled),
        ));
        *self.worker_pool.lock().await = Some(Arc::clone(&pool));

        let seed_count = self.seed_urls.len();
        let discovery_job = Arc::clone(self);
        tokio::spawn(async move { discovery_job.watch_discovery(seed_count).await });

        let status_job = Arc::clone(self);
        tokio::spawn(async move { status_job.watch_status().await });

        let run_job = Arc::clone(self);
        let run_pool = Arc::clone(&pool);
        tokio::spawn(async move { run_job.drive(run_pool).await });

        Ok(())
    }

    async fn drive(self: Arc<Self>, pool: Arc<WorkerPool>) {
        pool.run().await;
        *self.terminated_at.lock().await = Some(Instant::now());
        let mut state = self.state.lock().await;
        *state = if self.cancelled.load(Ordering::SeqCst) {
            JobState::Cancelled
        } else {
            JobState::Completed
        };
        drop(state);
        let snapshot = self.snapshot().await;
        info!(job_id = %self.id, state = ?snapshot.state, processed = snapshot.urls_processed, "job terminated");
        self.bus.publish_terminal(snapshot, false).await;
    }

    /// Polls Frontier length until it first drops below the seed
    /// count, marking the end of the "url discovery" phase and
    /// recording `url_discovery_ms`.
    async fn watch_discovery(self: Arc<Self>, seed_count: usize) {
        loop {
            if self.is_terminal().await {
                return;
            }
            let len = self.frontier.len().await;
            if len < seed_count {
                if let Some(start) = *self.started_at.lock().await {
                    self.url_discovery_ms
                        .store(start.elapsed().as_millis() as u64, Ordering::SeqCst);
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn watch_status(self: Arc<Self>) {
        loop {
            tokio::time::sleep(STATUS_TICK).await;
            if self.is_terminal().await {
                return;
            }
            let snapshot = self.snapshot().await;
            self.bus.publish_status_update(snapshot).await;
        }
    }

    async fn is_terminal(&self) -> bool {
        matches!(
            *self.state.lock().await,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Block until this Job reaches a terminal state.
    pub async fn wait_until_terminal(&self, poll_interval: Duration) {
        while !self.is_terminal().await {
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Request cancellation. Workers finish their in-flight page and
    /// the Frontier is discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.push_notify.notify_waiters();
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<ProgressEvent> {
        self.bus.subscribe(self.snapshot().await).await
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let state = *self.state.lock().await;
        let results = self.results().await;

        let urls_processed = results.len();
        let urls_discovered = self.frontier.visited_count().await;
        let urls_skipped_out_of_scope = self.frontier.urls_skipped_out_of_scope().await;
        let current_depth = results.iter().map(|r| r.depth).max().unwrap_or(0);

        let mut by_depth: std::collections::BTreeMap<usize, Vec<String>> =
            std::collections::BTreeMap::new();
        for r in &results {
            by_depth.entry(r.depth).or_default().push(r.url.clone());
        }
        let urls_by_depth = by_depth
            .into_iter()
            .map(|(depth, urls)| DepthStats { depth, urls })
            .collect();

        let crawling_ms: u64 = results.iter().map(|r| r.timing.crawl_ms).sum();
        let scraping_ms: u64 = results.iter().map(|r| r.timing.scrape_ms).sum();
        let total_ms = match (*self.started_at.lock().await, *self.terminated_at.lock().await) {
            (Some(start), Some(end)) => end.duration_since(start).as_millis() as u64,
            (Some(start), None) => start.elapsed().as_millis() as u64,
            _ => 0,
        };

        JobSnapshot {
            job_id: self.id.clone(),
            state,
            current_depth,
            urls_discovered,
            urls_processed,
            urls_skipped_out_of_scope,
            urls_by_depth,
            timing: AggregateTiming {
                url_discovery_ms: self.url_discovery_ms.load(Ordering::SeqCst),
                crawling_ms,
                scraping_ms,
                total_ms,
            },
            error: self.error.lock().await.clone(),
        }
    }

    /// The full terminal `CrawlResult`. Safe to call before terminal,
    /// but `unique_domains`/`sitemap` are only meaningful once the Job
    /// is done.
    pub async fn result(&self) -> CrawlResult {
        let results = self.results().await;
        let snapshot = self.snapshot().await;

        let mut unique_domains: Vec<String> = results
            .iter()
            .filter(|r| r.category != PageCategory::Error)
            .filter_map(|r| Url::parse(&r.url).ok())
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect();
        unique_domains.sort();
        unique_domains.dedup();

        let sitemap: Vec<String> = results
            .iter()
            .filter(|r| r.category != PageCategory::Error)
            .map(|r| r.url.clone())
            .collect();

        CrawlResult {
            job_id: self.id.clone(),
            seed_urls: self.seed_urls.iter().map(|u| u.to_string()).collect(),
            urls_by_depth: snapshot.urls_by_depth.clone(),
            snapshot,
            unique_domains,
            sitemap,
            results,
        }
    }

    pub fn mode(&self) -> CrawlMode {
        self.mode
    }

    pub fn policy(&self) -> Arc<ScopePolicy> {
        Arc::clone(&self.policy)
    }

    async fn results(&self) -> Vec<PageResult> {
        match self.worker_pool.lock().await.as_ref() {
            Some(pool) => pool.results.lock().await.clone(),
            None => Vec::new(),
        }
    }
}
