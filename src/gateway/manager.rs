//! Gateway Manager - lifecycle and command dispatch
//!
//! Owns the wired-together subsystems and the install/activate lifecycle:
//! open the current cache region, precache the app shell (all-or-nothing;
//! failure aborts startup so a previous region stays authoritative), then
//! purge stale regions. After that every protocol command flows through
//! `handle_command`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::intercept::{Classifier, FetchRequest, StrategyDispatcher};
use crate::ipc::protocol::{Command, Event, Response, PROTOCOL_VERSION};
use crate::notify::{NotificationDispatcher, NotificationPayload};
use crate::origin::OriginTransport;
use crate::store::RegionStore;
use crate::sync::DeferredTaskQueue;

/// Broadcast buffer per connected instance
const EVENT_CAPACITY: usize = 64;

/// The gateway: one instance per daemon process
pub struct GatewayManager<T: OriginTransport> {
    /// Loaded configuration
    config: GatewayConfig,
    /// Shared response cache
    store: Arc<RegionStore>,
    /// Origin fetch primitive, shared with background tasks
    transport: Arc<T>,
    /// Request classifier
    classifier: Classifier,
    /// Strategy executor
    dispatcher: StrategyDispatcher<T>,
    /// Deferred mutation queue
    queue: DeferredTaskQueue,
    /// Push notification routing
    notifier: NotificationDispatcher,
    /// Broadcast channel for events to all connected instances
    events: broadcast::Sender<Event>,
}

impl<T: OriginTransport> GatewayManager<T> {
    /// Install and activate the gateway
    pub async fn start(config: GatewayConfig, transport: T) -> Result<Self> {
        let root = config
            .cache_dir
            .clone()
            .unwrap_or_else(RegionStore::default_root);
        let store = Arc::new(RegionStore::open(root, &config.cache_version)?);
        let transport = Arc::new(transport);

        // Install: the shell must be fully cached before serving traffic
        store
            .initialize(&config.precache, transport.as_ref())
            .await
            .context("Precache failed, aborting activation")?;

        // Activate: previous versions die only after a successful install
        store.purge_stale(&config.cache_version);

        let classifier = Classifier::new(config.api_patterns.clone(), &config.precache);
        let dispatcher = StrategyDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            config.shell_root.clone(),
        );
        let queue = DeferredTaskQueue::open(
            config
                .queue_path
                .clone()
                .unwrap_or_else(DeferredTaskQueue::default_path),
        );
        let notifier = NotificationDispatcher::new(config.action_routes.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(version = %config.cache_version, "Gateway activated");

        Ok(Self {
            config,
            store,
            transport,
            classifier,
            dispatcher,
            queue,
            notifier,
            events,
        })
    }

    /// Socket path application instances connect to
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Subscribe to the event broadcast
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Process a command and return a response
    pub async fn handle_command(&self, command: Command) -> Response {
        match command {
            Command::Fetch(request) => self.handle_fetch(request).await,

            Command::Enqueue { tag, url, payload } => {
                let id = self.queue.enqueue(&tag, &url, payload).await;
                Response::Success {
                    message: Some(format!("Task {} queued under '{}'", id, tag)),
                }
            }

            Command::Connectivity { tag } => {
                let outcome = self
                    .queue
                    .replay(&tag, self.transport.as_ref(), &self.events)
                    .await;
                Response::Success {
                    message: Some(format!(
                        "Replayed {} task(s), {} still pending",
                        outcome.completed, outcome.kept
                    )),
                }
            }

            Command::Push { payload } => {
                self.notifier.display(&payload, &self.events);
                Response::Success { message: None }
            }

            Command::Action { action_id, payload } => {
                let payload = NotificationPayload::parse(payload.as_deref().unwrap_or("{}"));
                let route = self
                    .notifier
                    .handle_action(&action_id, &payload)
                    .map(|intent| intent.route);
                Response::Navigate { route }
            }

            Command::GetStatus => self.status().await,
        }
    }

    /// Classify and dispatch an intercepted request
    async fn handle_fetch(&self, request: FetchRequest) -> Response {
        let classification = self.classifier.classify(&request);
        debug!(
            method = %request.method,
            url = %request.url,
            classification = ?classification,
            "Dispatching intercepted request"
        );

        match self.dispatcher.dispatch(&request, classification).await {
            Ok(resolved) => Response::Fetched {
                source: resolved.source,
                snapshot: resolved.snapshot,
            },
            Err(e) => Response::Error {
                error: e.to_string(),
            },
        }
    }

    /// Aggregate gateway state for the status command
    async fn status(&self) -> Response {
        let (hits, misses) = self.store.stats();
        Response::Status {
            version: PROTOCOL_VERSION,
            cache_version: self.store.version().to_string(),
            entry_count: self.store.entry_count(),
            pending_tasks: self.queue.pending_count().await,
            hits,
            misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::intercept::ResponseSource;
    use crate::origin::OriginError;
    use crate::store::{RequestKey, ResponseSnapshot};

    /// Full-surface origin stub: fetch table, replay switch
    struct MockOrigin {
        responses: Mutex<HashMap<String, ResponseSnapshot>>,
        offline: AtomicBool,
    }

    impl MockOrigin {
        fn new(pages: &[(&str, &str)]) -> Self {
            let responses = pages
                .iter()
                .map(|(url, body)| {
                    (
                        url.to_string(),
                        ResponseSnapshot {
                            status: 200,
                            headers: vec![("content-type".to_string(), "text/html".to_string())],
                            body: body.as_bytes().to_vec(),
                        },
                    )
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                offline: AtomicBool::new(false),
            }
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    impl OriginTransport for Arc<MockOrigin> {
        fn fetch(
            &self,
            key: &RequestKey,
        ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send
        {
            let result = if self.offline.load(Ordering::SeqCst) {
                Err(OriginError::Network("connection refused".to_string()))
            } else {
                self.responses
                    .lock()
                    .unwrap()
                    .get(&key.url)
                    .cloned()
                    .ok_or_else(|| OriginError::Network("connection refused".to_string()))
            };
            async move { result }
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
            let result = if self.offline.load(Ordering::SeqCst) {
                Err(OriginError::Network("connection refused".to_string()))
            } else {
                Ok(ResponseSnapshot {
                    status: 200,
                    headers: Vec::new(),
                    body: Vec::new(),
                })
            };
            async move { result }
        }
    }

    fn test_config(tmp: &tempfile::TempDir) -> GatewayConfig {
        GatewayConfig {
            cache_dir: Some(tmp.path().join("cache")),
            queue_path: Some(tmp.path().join("queue.json")),
            ..GatewayConfig::default()
        }
    }

    async fn gateway(
        tmp: &tempfile::TempDir,
        origin: Arc<MockOrigin>,
    ) -> GatewayManager<Arc<MockOrigin>> {
        GatewayManager::start(test_config(tmp), origin).await.unwrap()
    }

    #[tokio::test]
    async fn test_startup_aborts_on_precache_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        // Origin has nothing; the "/" precache fetch fails
        let origin = Arc::new(MockOrigin::new(&[]));

        let result = GatewayManager::start(test_config(&tmp), origin).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_command_resolves_offline_fallback() {
        let tmp = tempfile::TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new(&[("/", "<html>shell</html>")]));
        let gw = gateway(&tmp, Arc::clone(&origin)).await;

        origin.go_offline();
        let response = gw
            .handle_command(Command::Fetch(FetchRequest {
                method: "GET".to_string(),
                url: "/api/budgets".to_string(),
                mode: None,
                destination: None,
                cross_origin: false,
            }))
            .await;

        match response {
            Response::Fetched { source, snapshot } => {
                assert_eq!(source, ResponseSource::Fallback);
                assert_eq!(snapshot.status, 503);
            }
            other => panic!("Expected Fetched response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_navigation_uses_precached_shell() {
        let tmp = tempfile::TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new(&[("/", "<html>shell</html>")]));
        let gw = gateway(&tmp, Arc::clone(&origin)).await;

        origin.go_offline();
        let response = gw
            .handle_command(Command::Fetch(FetchRequest {
                method: "GET".to_string(),
                url: "/app/reports".to_string(),
                mode: Some("navigate".to_string()),
                destination: None,
                cross_origin: false,
            }))
            .await;

        match response {
            Response::Fetched { source, snapshot } => {
                assert_eq!(source, ResponseSource::Cache);
                assert_eq!(snapshot.body, b"<html>shell</html>");
            }
            other => panic!("Expected Fetched response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_connectivity_replays_and_broadcasts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new(&[("/", "<html>shell</html>")]));
        let gw = gateway(&tmp, Arc::clone(&origin)).await;
        let mut events = gw.subscribe();

        gw.handle_command(Command::Enqueue {
            tag: "sync-transactions".to_string(),
            url: "/api/transactions".to_string(),
            payload: serde_json::json!({"amount": 12}),
        })
        .await;

        gw.handle_command(Command::Connectivity {
            tag: "sync-transactions".to_string(),
        })
        .await;

        match events.try_recv().unwrap() {
            Event::Synced { event_type } => assert_eq!(event_type, "TRANSACTIONS_SYNCED"),
            _ => panic!("Expected Synced event"),
        }

        // Queue drained
        match gw.handle_command(Command::GetStatus).await {
            Response::Status { pending_tasks, .. } => assert_eq!(pending_tasks, 0),
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_command_resolves_route() {
        let tmp = tempfile::TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new(&[("/", "<html>shell</html>")]));
        let gw = gateway(&tmp, origin).await;

        let response = gw
            .handle_command(Command::Action {
                action_id: "explore".to_string(),
                payload: None,
            })
            .await;
        assert!(matches!(
            response,
            Response::Navigate { route: Some(ref r) } if r == "/"
        ));

        let response = gw
            .handle_command(Command::Action {
                action_id: "close".to_string(),
                payload: None,
            })
            .await;
        assert!(matches!(response, Response::Navigate { route: None }));
    }

    #[tokio::test]
    async fn test_status_reports_cache_state() {
        let tmp = tempfile::TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new(&[("/", "<html>shell</html>")]));
        let gw = gateway(&tmp, origin).await;

        match gw.handle_command(Command::GetStatus).await {
            Response::Status {
                version,
                cache_version,
                entry_count,
                ..
            } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(cache_version, "v1");
                // The precached shell
                assert_eq!(entry_count, 1);
            }
            other => panic!("Expected Status response, got {:?}", other),
        }
    }
}
