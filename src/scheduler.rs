//! Runs up to `parallel_kbs` Jobs concurrently, each scoped to a
//! distinct set of path prefixes, all sharing one Fetcher transport
//! and one per-host Rate Limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;
use url::Url;

use crate::core::config::{clamp_max_depth, EngineConfig};
use crate::core::error::JobError;
use crate::core::types::{CrawlMode, JobState, MultiJobSnapshot};
use crate::fetcher::Fetcher;
use crate::job::{Job, JobSpec};
use crate::rate_limiter::RateLimiter;
use crate::url_scope::{self, directory_prefixes};

/// One named bundle of entry URLs (a "knowledge base" scope).
#[derive(Debug, Clone)]
pub struct ScopeSpec {
    pub id: String,
    pub name: String,
    pub entry_urls: Vec<String>,
    pub active: bool,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MultiJobSpec {
    pub domain: String,
    pub scopes: Vec<ScopeSpec>,
    pub mode: CrawlMode,
    pub max_depth: usize,
    pub worker_count: usize,
    pub allow_subdomains: bool,
    pub include_child_pages: bool,
    pub parallel_kbs: usize,
}

pub struct MultiScopeScheduler {
    jobs: Vec<(String, Arc<Job>)>,
    overlapping_scopes: Vec<(String, String)>,
    /// Bounds how many scoped Jobs run concurrently (`parallel_kbs`);
    /// Jobs beyond the limit stay `pending` until a running sibling
    /// reaches a terminal state.
    concurrency: Arc<Semaphore>,
}

impl MultiScopeScheduler {
    /// Validate every scope and build one pending `Job` per active
    /// scope, path-prefix-isolated, sharing `fetcher`/`rate_limiter`.
    pub fn new(
        spec: MultiJobSpec,
        engine_config: &EngineConfig,
        fetcher: Arc<Fetcher>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, JobError> {
        let max_depth = clamp_max_depth(spec.max_depth);
        let parallel_kbs = spec.parallel_kbs.clamp(
            crate::core::config::MIN_PARALLEL_KBS,
            crate::core::config::MAX_PARALLEL_KBS,
        );

        let mut jobs = Vec::new();
        let mut scope_prefixes: HashMap<String, Vec<String>> = HashMap::new();

        for scope in spec.scopes.iter().filter(|s| s.active) {
            if scope.name.trim().is_empty() {
                return Err(JobError::ScopeMissingName(scope.id.clone()));
            }
            let entry_urls: Vec<Url> = scope
                .entry_urls
                .iter()
                .filter_map(|raw| url_scope::canonicalize(raw, None))
                .filter(|u| {
                    u.host_str()
                        .map(|h| h.eq_ignore_ascii_case(&spec.domain))
                        .unwrap_or(false)
                        || spec.allow_subdomains
                })
                .collect();
            if entry_urls.is_empty() {
                return Err(JobError::ScopeWithoutEntries(scope.id.clone()));
            }

            let prefixes = directory_prefixes(entry_urls.iter());
            scope_prefixes.insert(scope.id.clone(), prefixes.clone());

            let job_spec = JobSpec {
                seed_urls: entry_urls.iter().map(|u| u.to_string()).collect(),
                mode: spec.mode,
                max_depth: scope.max_depth.unwrap_or(max_depth),
                worker_count: spec.worker_count,
                allow_subdomains: spec.allow_subdomains,
                allowed_domains: vec![spec.domain.clone()],
                include_child_pages: spec.include_child_pages,
                include_patterns: Vec::new(),
                exclude_patterns: crate::url_scope::ScopePolicy::default_excludes(),
                allowed_path_prefixes: prefixes,
            };

            let job = Arc::new(Job::new(
                format!("{}-{}", spec.domain, scope.id),
                job_spec,
                engine_config,
                Arc::clone(&fetcher),
                rate_limiter.clone(),
            )?);

            jobs.push((scope.id.clone(), job));
        }

        if jobs.is_empty() {
            return Err(JobError::NoValidSeeds);
        }

        let overlapping_scopes = find_overlaps(&scope_prefixes);
        for (a, b) in &overlapping_scopes {
            warn!(scope_a = %a, scope_b = %b, "overlapping scope path prefixes");
        }

        Ok(Self {
            jobs,
            overlapping_scopes,
            concurrency: Arc::new(Semaphore::new(parallel_kbs)),
        })
    }

    /// Start every scope's Job, gated by `parallel_kbs` concurrent
    /// runners: a Job beyond the limit waits for a permit released by
    /// a sibling reaching a terminal state.
    pub async fn start(&self) -> Result<(), JobError> {
        for (_, job) in &self.jobs {
            let job = Arc::clone(job);
            let permit = Arc::clone(&self.concurrency);
            tokio::spawn(async move {
                let Ok(guard) = permit.acquire_owned().await else {
                    return;
                };
                if let Err(e) = job.start().await {
                    warn!(job_id = %job.id, error = %e, "scoped job failed to start");
                    drop(guard);
                    return;
                }
                job.wait_until_terminal(Duration::from_millis(100)).await;
                drop(guard);
            });
        }
        Ok(())
    }

    pub fn cancel(&self) {
        for (_, job) in &self.jobs {
            job.cancel();
        }
    }

    pub fn overlapping_scopes(&self) -> &[(String, String)] {
        &self.overlapping_scopes
    }

    pub fn job(&self, scope_id: &str) -> Option<Arc<Job>> {
        self.jobs.iter().find(|(id, _)| id == scope_id).map(|(_, j)| Arc::clone(j))
    }

    /// Aggregated snapshot across every scoped Job.
    pub async fn snapshot(&self) -> MultiJobSnapshot {
        let mut per_job = Vec::with_capacity(self.jobs.len());
        for (_, job) in &self.jobs {
            per_job.push(job.snapshot().await);
        }

        let urls_discovered = per_job.iter().map(|s| s.urls_discovered).sum();
        let urls_processed = per_job.iter().map(|s| s.urls_processed).sum();

        let state = if per_job.iter().all(|s| s.state == JobState::Completed) {
            JobState::Completed
        } else if per_job.iter().any(|s| s.state == JobState::Failed) {
            JobState::Failed
        } else if per_job
            .iter()
            .all(|s| matches!(s.state, JobState::Completed | JobState::Cancelled))
        {
            JobState::Cancelled
        } else {
            JobState::Running
        };

        MultiJobSnapshot {
            state,
            urls_discovered,
            urls_processed,
            per_job,
            overlapping_scopes: self.overlapping_scopes.clone(),
        }
    }

    /// Block until every scoped Job has reached a terminal state.
    pub async fn wait_until_terminal(&self, poll_interval: Duration) {
        loop {
            let snapshot = self.snapshot().await;
            if matches!(
                snapshot.state,
                JobState::Completed | JobState::Failed | JobState::Cancelled
            ) {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn find_overlaps(scope_prefixes: &HashMap<String, Vec<String>>) -> Vec<(String, String)> {
    let mut ids: Vec<&String> = scope_prefixes.keys().collect();
    ids.sort();
    let mut overlaps = Vec::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let a = &scope_prefixes[ids[i]];
            let b = &scope_prefixes[ids[j]];
            if a.iter().any(|pa| b.iter().any(|pb| pa.starts_with(pb.as_str()) || pb.starts_with(pa.as_str()))) {
                overlaps.push((ids[i].clone(), ids[j].clone()));
            }
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn spec(scopes: Vec<ScopeSpec>) -> MultiJobSpec {
        MultiJobSpec {
            domain: "example.com".to_string(),
            scopes,
            mode: CrawlMode::CrawlScrape,
            max_depth: 2,
            worker_count: 2,
            allow_subdomains: false,
            include_child_pages: true,
            parallel_kbs: 2,
        }
    }

    fn scope(id: &str, entry: &str) -> ScopeSpec {
        ScopeSpec {
            id: id.to_string(),
            name: id.to_string(),
            entry_urls: vec![entry.to_string()],
            active: true,
            max_depth: None,
        }
    }

    #[tokio::test]
    async fn rejects_scope_without_valid_entries() {
        let s = spec(vec![ScopeSpec {
            id: "s1".to_string(),
            name: "s1".to_string(),
            entry_urls: vec!["javascript:void(0)".to_string()],
            active: true,
            max_depth: None,
        }]);
        let fetcher = Arc::new(Fetcher::new(StdDuration::from_secs(5), 10, 0));
        let limiter = RateLimiter::new(StdDuration::from_millis(10), StdDuration::from_secs(1));
        let err = MultiScopeScheduler::new(s, &EngineConfig::default(), fetcher, limiter).unwrap_err();
        assert!(matches!(err, JobError::ScopeWithoutEntries(_)));
    }

    #[tokio::test]
    async fn detects_overlapping_prefixes() {
        let s = spec(vec![
            scope("s1", "https://example.com/a/i"),
            scope("s2", "https://example.com/a/j"),
        ]);
        let fetcher = Arc::new(Fetcher::new(StdDuration::from_secs(5), 10, 0));
        let limiter = RateLimiter::new(StdDuration::from_millis(10), StdDuration::from_secs(1));
        let scheduler =
            MultiScopeScheduler::new(s, &EngineConfig::default(), fetcher, limiter).unwrap();
        assert_eq!(scheduler.overlapping_scopes().len(), 1);
    }

    #[tokio::test]
    async fn disjoint_prefixes_do_not_overlap() {
        let s = spec(vec![
            scope("s1", "https://example.com/a/i"),
            scope("s2", "https://example.com/b/j"),
        ]);
        let fetcher = Arc::new(Fetcher::new(StdDuration::from_secs(5), 10, 0));
        let limiter = RateLimiter::new(StdDuration::from_millis(10), StdDuration::from_secs(1));
        let scheduler =
            MultiScopeScheduler::new(s, &EngineConfig::default(), fetcher, limiter).unwrap();
        assert!(scheduler.overlapping_scopes().is_empty());
    }
}
