//! Fan-out of typed events to subscribers without blocking worker
//! progress. `status_update` events may be
//! dropped for a lagging subscriber; `page_complete` and terminal
//! events must be delivered or the subscriber is dropped with a
//! `subscriber_overflow` terminal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::core::types::{JobSnapshot, PageResult};

const SUBSCRIBER_BUFFER: usize = 1024;
const OVERFLOW_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// One event on the bus.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    InitialStatus(JobSnapshot),
    StatusUpdate(JobSnapshot),
    PageComplete(Box<PageResult>),
    JobCompleted(JobSnapshot),
    JobFailed(JobSnapshot),
    /// Sent in place of further events when a subscriber's buffer
    /// overflowed on a critical (non-coalescible) event; the
    /// subscriber is then dropped from the bus.
    SubscriberOverflow,
}

impl ProgressEvent {
    fn is_coalescible(&self) -> bool {
        matches!(self, ProgressEvent::StatusUpdate(_))
    }
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<ProgressEvent>,
}

#[derive(Clone)]
pub struct ProgressBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe, receiving `initial` as the first event.
    pub async fn subscribe(&self, initial: JobSnapshot) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let _ = tx.try_send(ProgressEvent::InitialStatus(initial));
        let mut subs = self.subscribers.lock().await;
        subs.push(Subscriber {
            id: Uuid::new_v4(),
            tx,
        });
        rx
    }

    /// Publish `event` to every subscriber. Never awaits on a
    /// subscriber's channel directly — slow subscribers are handled
    /// out-of-band so this never back-pressures a worker.
    pub async fn publish(&self, event: ProgressEvent) {
        let mut subs = self.subscribers.lock().await;
        let mut overflowed = Vec::new();

        for sub in subs.iter() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if event.is_coalescible() {
                        // Drop-oldest policy approximation: the
                        // subscriber is behind on status_update;
                        // this update is simply skipped for it.
                        continue;
                    }
                    overflowed.push((sub.id, sub.tx.clone()));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    overflowed.push((sub.id, sub.tx.clone()));
                }
            }
        }

        if !overflowed.is_empty() {
            let ids: Vec<Uuid> = overflowed.iter().map(|(id, _)| *id).collect();
            subs.retain(|s| !ids.contains(&s.id));
        }
        drop(subs);

        for (_, tx) in overflowed {
            tokio::spawn(async move {
                let _ = tokio::time::timeout(
                    OVERFLOW_DELIVERY_TIMEOUT,
                    tx.send(ProgressEvent::SubscriberOverflow),
                )
                .await;
            });
        }
    }

    pub async fn publish_page_complete(&self, result: PageResult) {
        self.publish(ProgressEvent::PageComplete(Box::new(result))).await;
    }

    pub async fn publish_status_update(&self, snapshot: JobSnapshot) {
        self.publish(ProgressEvent::StatusUpdate(snapshot)).await;
    }

    pub async fn publish_terminal(&self, snapshot: JobSnapshot, failed: bool) {
        let event = if failed {
            ProgressEvent::JobFailed(snapshot)
        } else {
            ProgressEvent::JobCompleted(snapshot)
        };
        self.publish(event).await;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        AggregateTiming, DepthStats, JobState, PageCategory, PageStatus, SkipReason, Timing,
    };
    use crate::core::error::Failure;

    fn snapshot() -> JobSnapshot {
        JobSnapshot {
            job_id: "job-1".to_string(),
            state: JobState::Running,
            current_depth: 0,
            urls_discovered: 1,
            urls_processed: 0,
            urls_skipped_out_of_scope: 0,
            urls_by_depth: vec![DepthStats::default()],
            timing: AggregateTiming::default(),
            error: None,
        }
    }

    fn page_result() -> PageResult {
        PageResult {
            url: "https://example.com/".to_string(),
            parent_url: None,
            depth: 0,
            title: None,
            links_found: 0,
            status: PageStatus::Crawled,
            has_content: false,
            content: String::new(),
            content_chars: 0,
            truncated: false,
            timing: Timing::default(),
            failure: Failure::none(),
            is_same_domain: true,
            is_subdomain: false,
            category: PageCategory::SameDomainSuccess,
            skip_reason: SkipReason::None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_initial_then_published_events() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe(snapshot()).await;
        bus.publish_page_complete(page_result()).await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::InitialStatus(_)));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, ProgressEvent::PageComplete(_)));
    }

    #[tokio::test]
    async fn terminal_event_is_always_delivered() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe(snapshot()).await;
        let _ = rx.recv().await; // drain initial
        bus.publish_terminal(snapshot(), false).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ProgressEvent::JobCompleted(_)));
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_without_panicking() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe(snapshot()).await;
        drop(rx);
        bus.publish_page_complete(page_result()).await;
        tokio::task::yield_now().await;
        assert_eq!(bus.subscriber_count().await, 0);
    }
}
