//! A FIFO of pending pages plus the set of URLs ever admitted, mutated
//! under a single lock so duplicate admission and scope checks hold
//! under concurrency.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::Mutex;
use url::Url;

use crate::url_scope::ScopePolicy;

/// One pending unit of work.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: usize,
    pub parent: Option<Url>,
}

/// Outcome of `try_admit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    OutOfScope,
    Duplicate,
    TooDeep,
    Invalid,
}

struct Inner {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<Url>,
    depth_counts: HashMap<usize, usize>,
    urls_skipped_out_of_scope: usize,
    /// Entries popped but not yet fully processed (child admissions
    /// still pending). Tracked under the same lock as the queue so a
    /// peer's drained check can never race a pop (spec §4.7/§9).
    active: usize,
}

/// Frontier + Visited, guarded by a single lock (the owning Job's).
pub struct Frontier {
    inner: Mutex<Inner>,
    max_depth: usize,
}

impl Frontier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                visited: HashSet::new(),
                depth_counts: HashMap::new(),
                urls_skipped_out_of_scope: 0,
                active: 0,
            }),
            max_depth,
        }
    }

    /// The single place admission is enforced: scope admission and the
    /// visited check happen in the same critical section as the
    /// enqueue, before any worker can start fetching `raw`.
    pub async fn try_admit(
        &self,
        raw: &str,
        depth: usize,
        parent: Option<&Url>,
        policy: &ScopePolicy,
    ) -> AdmitOutcome {
        let Some(url) = crate::url_scope::canonicalize(raw, parent) else {
            return AdmitOutcome::Invalid;
        };
        self.try_admit_canonical(url, depth, parent.cloned(), policy)
            .await
    }

    async fn try_admit_canonical(
        &self,
        url: Url,
        depth: usize,
        parent: Option<Url>,
        policy: &ScopePolicy,
    ) -> AdmitOutcome {
        let mut inner = self.inner.lock().await;

        if !policy.admits(&url) {
            inner.urls_skipped_out_of_scope += 1;
            return AdmitOutcome::OutOfScope;
        }
        if inner.visited.contains(&url) {
            return AdmitOutcome::Duplicate;
        }
        if depth > self.max_depth {
            return AdmitOutcome::TooDeep;
        }

        inner.visited.insert(url.clone());
        inner.queue.push_back(FrontierEntry { url, depth, parent });
        AdmitOutcome::Admitted
    }

    /// Admit a seed URL directly (already canonical, no scope check
    /// bypass — seeds still must satisfy the policy).
    pub async fn try_admit_seed(&self, url: Url, policy: &ScopePolicy) -> AdmitOutcome {
        self.try_admit_canonical(url, 0, None, policy).await
    }

    /// Pop the next entry; updates the depth histogram on pop, not
    /// push. Marks the entry "active" in the same critical section as
    /// the pop itself, so a peer calling `is_drained` can never observe
    /// an empty queue with this entry not yet accounted for — the exact
    /// race the naive "queue empty ⇒ done" check is vulnerable to.
    /// Callers MUST call `finish()` exactly once after the entry
    /// (including any child admissions it triggers) is fully processed.
    pub async fn pop(&self) -> Option<FrontierEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner.queue.pop_front()?;
        *inner.depth_counts.entry(entry.depth).or_insert(0) += 1;
        inner.active += 1;
        Some(entry)
    }

    /// Mark one previously popped entry as fully processed.
    pub async fn finish(&self) {
        let mut inner = self.inner.lock().await;
        debug_assert!(inner.active > 0);
        inner.active = inner.active.saturating_sub(1);
    }

    /// True iff the queue is empty and no popped entry is still being
    /// processed. Checked under the same lock `pop`/`finish` use, so
    /// this can never race a peer's in-flight pop.
    pub async fn is_drained(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.queue.is_empty() && inner.active == 0
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.queue.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn visited_count(&self) -> usize {
        self.inner.lock().await.visited.len()
    }

    pub async fn urls_skipped_out_of_scope(&self) -> usize {
        self.inner.lock().await.urls_skipped_out_of_scope
    }

    pub async fn depth_counts(&self) -> HashMap<usize, usize> {
        self.inner.lock().await.depth_counts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn duplicate_urls_are_rejected() {
        let frontier = Frontier::new(5);
        let policy = ScopePolicy::new("example.com");
        let seed = url("https://example.com/");
        assert_eq!(
            frontier.try_admit_seed(seed.clone(), &policy).await,
            AdmitOutcome::Admitted
        );
        assert_eq!(
            frontier.try_admit_seed(seed, &policy).await,
            AdmitOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn out_of_scope_urls_are_rejected_and_counted() {
        let frontier = Frontier::new(5);
        let policy = ScopePolicy::new("example.com");
        let outside = url("https://other.test/x");
        assert_eq!(
            frontier.try_admit_canonical(outside, 1, None, &policy).await,
            AdmitOutcome::OutOfScope
        );
        assert_eq!(frontier.urls_skipped_out_of_scope().await, 1);
    }

    #[tokio::test]
    async fn too_deep_urls_are_rejected() {
        let frontier = Frontier::new(1);
        let policy = ScopePolicy::new("example.com");
        let deep = url("https://example.com/deep");
        assert_eq!(
            frontier.try_admit_canonical(deep, 2, None, &policy).await,
            AdmitOutcome::TooDeep
        );
    }

    #[tokio::test]
    async fn depth_histogram_updates_on_pop_not_push() {
        let frontier = Frontier::new(5);
        let policy = ScopePolicy::new("example.com");
        frontier
            .try_admit_seed(url("https://example.com/"), &policy)
            .await;
        assert!(frontier.depth_counts().await.is_empty());
        frontier.pop().await;
        assert_eq!(frontier.depth_counts().await.get(&0), Some(&1));
    }

    #[tokio::test]
    async fn is_drained_false_while_a_popped_entry_is_still_active() {
        let frontier = Frontier::new(5);
        let policy = ScopePolicy::new("example.com");
        frontier
            .try_admit_seed(url("https://example.com/"), &policy)
            .await;
        let entry = frontier.pop().await.unwrap();
        assert!(!frontier.is_drained().await);
        drop(entry);
        frontier.finish().await;
        assert!(frontier.is_drained().await);
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let frontier = Frontier::new(5);
        let policy = ScopePolicy::new("example.com");
        frontier
            .try_admit_canonical(url("https://example.com/a"), 1, None, &policy)
            .await;
        frontier
            .try_admit_canonical(url("https://example.com/b"), 1, None, &policy)
            .await;
        let first = frontier.pop().await.unwrap();
        let second = frontier.pop().await.unwrap();
        assert_eq!(first.url.path(), "/a");
        assert_eq!(second.url.path(), "/b");
    }
}
