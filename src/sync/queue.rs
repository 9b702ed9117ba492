//! Deferred Task Queue (Background Sync)
//!
//! Mutations that could not reach the origin wait here, persisted to disk,
//! until the environment signals that connectivity is back for their tag.
//! A drain replays each pending task exactly once per signal; failures stay
//! queued for the next signal. There is no TTL and no automatic
//! abandonment: a task leaves the queue only by replaying successfully.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::ipc::protocol::Event;
use crate::origin::OriginTransport;
use crate::store::unix_now;

/// A mutation awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredTask {
    /// Queue-local identifier
    pub id: u64,
    /// Sync tag grouping related mutations
    pub tag: String,
    /// Original endpoint to POST the payload back to
    pub url: String,
    /// Mutation body
    pub payload: serde_json::Value,
    /// Unix timestamp (seconds) when the task was enqueued
    pub enqueued_at: u64,
}

/// Persisted queue file contents
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueState {
    tasks: Vec<DeferredTask>,
    next_id: u64,
}

/// Result of draining one tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Tasks replayed successfully and removed
    pub completed: usize,
    /// Tasks that failed and stay pending
    pub kept: usize,
}

/// Disk-persisted queue of deferred mutations
pub struct DeferredTaskQueue {
    /// Path of the persisted queue file
    path: PathBuf,
    /// Queue state; the async lock also serializes drains so each signal
    /// replays a task at most once
    state: Mutex<QueueState>,
}

impl DeferredTaskQueue {
    /// Open the queue, loading any persisted tasks
    ///
    /// A missing file starts an empty queue; an unreadable one is discarded
    /// with a warning rather than blocking startup.
    pub fn open(path: PathBuf) -> Self {
        let state = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<QueueState>(&data) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        pending = state.tasks.len(),
                        "Deferred task queue loaded"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Discarding unreadable queue file"
                    );
                    QueueState::default()
                }
            },
            Err(_) => QueueState::default(),
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Default queue path under the platform data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("offgate")
            .join("queue.json")
    }

    /// Record a mutation that could not reach the origin
    pub async fn enqueue(&self, tag: &str, url: &str, payload: serde_json::Value) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.push(DeferredTask {
            id,
            tag: tag.to_string(),
            url: url.to_string(),
            payload,
            enqueued_at: unix_now(),
        });
        self.persist(&state);

        info!(tag = tag, url = url, id = id, "Deferred task enqueued");
        id
    }

    /// Replay every pending task under `tag` once
    ///
    /// Successes are removed and announced to all open application
    /// instances; failures stay pending for the next connectivity signal.
    /// Other tags are never touched.
    pub async fn replay<T: OriginTransport>(
        &self,
        tag: &str,
        transport: &T,
        events: &broadcast::Sender<Event>,
    ) -> ReplayOutcome {
        let mut state = self.state.lock().await;
        let pending: Vec<DeferredTask> = state
            .tasks
            .iter()
            .filter(|t| t.tag == tag)
            .cloned()
            .collect();

        if pending.is_empty() {
            debug!(tag = tag, "No deferred tasks for tag");
            return ReplayOutcome::default();
        }

        info!(tag = tag, count = pending.len(), "Replaying deferred tasks");
        let mut outcome = ReplayOutcome::default();

        for task in pending {
            match transport.replay(&task.url, &task.payload).await {
                Ok(snapshot) if snapshot.is_success() => {
                    state.tasks.retain(|t| t.id != task.id);
                    outcome.completed += 1;
                    debug!(id = task.id, url = %task.url, "Deferred task replayed");

                    // Receiver-less send just means no instance is connected
                    let _ = events.send(Event::Synced {
                        event_type: sync_event_type(tag),
                    });
                }
                Ok(snapshot) => {
                    outcome.kept += 1;
                    warn!(
                        id = task.id,
                        status = snapshot.status,
                        "Replay rejected by origin, task stays queued"
                    );
                }
                Err(e) => {
                    outcome.kept += 1;
                    warn!(id = task.id, error = %e, "Replay failed, task stays queued");
                }
            }
        }

        self.persist(&state);
        outcome
    }

    /// Number of tasks waiting for a connectivity signal
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// Write the queue file atomically; failure is logged, not fatal
    fn persist(&self, state: &QueueState) {
        let result = (|| -> std::io::Result<()> {
            let parent = match self.path.parent() {
                Some(parent) => {
                    fs::create_dir_all(parent)?;
                    parent
                }
                None => return Err(std::io::Error::other("queue path has no parent")),
            };

            let data = serde_json::to_vec(state)?;
            let mut tmp = tempfile::Builder::new().suffix(".tmp").tempfile_in(parent)?;
            tmp.write_all(&data)?;
            tmp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist task queue");
        }
    }
}

/// Derive the broadcast event name from a sync tag:
/// `sync-transactions` becomes `TRANSACTIONS_SYNCED`
pub fn sync_event_type(tag: &str) -> String {
    let domain = tag.strip_prefix("sync-").unwrap_or(tag);
    format!("{}_SYNCED", domain.replace('-', "_").to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::origin::OriginError;
    use crate::store::{RequestKey, ResponseSnapshot};

    /// Replay target that can be toggled between accepting and refusing
    struct ReplayOrigin {
        online: AtomicBool,
        posts: AtomicUsize,
    }

    impl ReplayOrigin {
        fn new(online: bool) -> Self {
            Self {
                online: AtomicBool::new(online),
                posts: AtomicUsize::new(0),
            }
        }

        fn go_online(&self) {
            self.online.store(true, Ordering::SeqCst);
        }

        fn post_count(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }
    }

    impl OriginTransport for ReplayOrigin {
        fn fetch(
            &self,
            _key: &RequestKey,
        ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send
        {
            async move { Err(OriginError::Network("not used".to_string())) }
        }

        fn fetch_fresh(
            &self,
            key: &RequestKey,
        ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send
        {
            self.fetch(key)
        }

        fn replay(
            &self,
            _url: &str,
            _payload: &serde_json::Value,
        ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send
        {
            self.posts.fetch_add(1, Ordering::SeqCst);
            let result = if self.online.load(Ordering::SeqCst) {
                Ok(ResponseSnapshot {
                    status: 200,
                    headers: Vec::new(),
                    body: Vec::new(),
                })
            } else {
                Err(OriginError::Network("connection refused".to_string()))
            };
            async move { result }
        }
    }

    fn queue_in(tmp: &tempfile::TempDir) -> DeferredTaskQueue {
        DeferredTaskQueue::open(tmp.path().join("queue.json"))
    }

    #[test]
    fn test_sync_event_type_derivation() {
        assert_eq!(sync_event_type("sync-transactions"), "TRANSACTIONS_SYNCED");
        assert_eq!(sync_event_type("sync-budget-edits"), "BUDGET_EDITS_SYNCED");
        assert_eq!(sync_event_type("reports"), "REPORTS_SYNCED");
    }

    #[tokio::test]
    async fn test_enqueue_and_pending_count() {
        let tmp = tempfile::TempDir::new().unwrap();
        let queue = queue_in(&tmp);

        queue
            .enqueue(
                "sync-transactions",
                "/api/transactions",
                serde_json::json!({"amount": 12}),
            )
            .await;
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();

        {
            let queue = queue_in(&tmp);
            queue
                .enqueue(
                    "sync-transactions",
                    "/api/transactions",
                    serde_json::json!({"amount": 12}),
                )
                .await;
        }

        let queue = queue_in(&tmp);
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_queue_file_starts_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("queue.json");
        fs::write(&path, b"not json at all").unwrap();

        let queue = DeferredTaskQueue::open(path);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_replay_success_removes_task_and_broadcasts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let queue = queue_in(&tmp);
        let origin = ReplayOrigin::new(true);
        let (events, mut rx) = broadcast::channel(8);

        queue
            .enqueue(
                "sync-transactions",
                "/api/transactions",
                serde_json::json!({"amount": 12}),
            )
            .await;

        let outcome = queue.replay("sync-transactions", &origin, &events).await;
        assert_eq!(outcome, ReplayOutcome { completed: 1, kept: 0 });
        assert_eq!(queue.pending_count().await, 0);
        assert_eq!(origin.post_count(), 1);

        match rx.try_recv().unwrap() {
            Event::Synced { event_type } => assert_eq!(event_type, "TRANSACTIONS_SYNCED"),
            _ => panic!("Expected Synced event"),
        }
    }

    #[tokio::test]
    async fn test_replay_failure_keeps_task_for_next_signal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let queue = queue_in(&tmp);
        let origin = ReplayOrigin::new(false);
        let (events, mut rx) = broadcast::channel(8);

        queue
            .enqueue(
                "sync-transactions",
                "/api/transactions",
                serde_json::json!({"amount": 12}),
            )
            .await;

        // First signal: exactly one POST, task stays
        let outcome = queue.replay("sync-transactions", &origin, &events).await;
        assert_eq!(outcome, ReplayOutcome { completed: 0, kept: 1 });
        assert_eq!(queue.pending_count().await, 1);
        assert_eq!(origin.post_count(), 1);
        assert!(rx.try_recv().is_err());

        // Second signal after connectivity returns: retried and completed
        origin.go_online();
        let outcome = queue.replay("sync-transactions", &origin, &events).await;
        assert_eq!(outcome, ReplayOutcome { completed: 1, kept: 0 });
        assert_eq!(queue.pending_count().await, 0);
        assert_eq!(origin.post_count(), 2);
    }

    #[tokio::test]
    async fn test_replay_is_isolated_per_tag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let queue = queue_in(&tmp);
        let origin = ReplayOrigin::new(true);
        let (events, _rx) = broadcast::channel(8);

        queue
            .enqueue("sync-transactions", "/api/transactions", serde_json::json!({}))
            .await;
        queue
            .enqueue("sync-budgets", "/api/budgets", serde_json::json!({}))
            .await;

        queue.replay("sync-transactions", &origin, &events).await;

        // The other tag's task is untouched
        assert_eq!(queue.pending_count().await, 1);
        assert_eq!(origin.post_count(), 1);
    }
}
