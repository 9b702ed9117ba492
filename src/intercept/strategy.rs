//! Caching Strategy Dispatcher
//!
//! Executes one of three strategies per classified request. Each request is
//! independent and stateless beyond its classification; the only shared
//! state is the region store, whose atomic per-key put gives racing
//! background writes last-write-wins semantics without blocking any
//! response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::origin::{OriginError, OriginTransport};
use crate::store::{RegionStore, RequestKey, ResponseSnapshot};

use super::classify::{FetchRequest, RequestClassification};
use super::fallback;

/// Where a resolved response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseSource {
    /// Fresh from the origin
    Network,
    /// Served from the cache store
    Cache,
    /// Synthesized offline fallback
    Fallback,
}

/// A resolved response and its provenance
#[derive(Debug, Clone)]
pub struct Resolved {
    pub source: ResponseSource,
    pub snapshot: ResponseSnapshot,
}

impl Resolved {
    fn network(snapshot: ResponseSnapshot) -> Self {
        Self {
            source: ResponseSource::Network,
            snapshot,
        }
    }

    fn cached(snapshot: ResponseSnapshot) -> Self {
        Self {
            source: ResponseSource::Cache,
            snapshot,
        }
    }

    fn fallback(snapshot: ResponseSnapshot) -> Self {
        Self {
            source: ResponseSource::Fallback,
            snapshot,
        }
    }
}

/// Failures that reach the caller. Most failures are absorbed into cached
/// snapshots or synthesized fallbacks; these are the deliberate exceptions.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Uncached script/style/image with the network down. No sane fallback
    /// exists, so this fails loudly.
    #[error("static asset unavailable: {url}: {source}")]
    AssetUnavailable { url: String, source: OriginError },

    /// A passthrough (mutation) request could not reach the origin. The
    /// application layer reacts by enqueueing a deferred task.
    #[error("origin unreachable for {url}: {source}")]
    OriginUnreachable { url: String, source: OriginError },
}

/// Maps request classifications to caching strategies and runs them
pub struct StrategyDispatcher<T: OriginTransport> {
    /// Shared response cache
    store: Arc<RegionStore>,
    /// Origin fetch primitive
    transport: Arc<T>,
    /// Precached app-shell root served to offline navigations
    shell_root: String,
}

impl<T: OriginTransport> StrategyDispatcher<T> {
    pub fn new(store: Arc<RegionStore>, transport: Arc<T>, shell_root: String) -> Self {
        Self {
            store,
            transport,
            shell_root,
        }
    }

    /// Execute the strategy for a classified request
    pub async fn dispatch(
        &self,
        request: &FetchRequest,
        classification: RequestClassification,
    ) -> Result<Resolved, DispatchError> {
        match classification {
            RequestClassification::StaticAsset | RequestClassification::PrecacheShell => {
                self.cache_first(request).await
            }
            RequestClassification::ApiPattern | RequestClassification::Navigation => {
                self.network_first(request, classification).await
            }
            RequestClassification::Other => {
                if request.is_get() {
                    // Safe default: same policy as api-pattern
                    self.network_first(request, classification).await
                } else {
                    self.forward_only(request).await
                }
            }
        }
    }

    /// Pure passthrough for mutations and cross-origin probes: no cache
    /// read, no cache write, transport failures propagate
    async fn forward_only(&self, request: &FetchRequest) -> Result<Resolved, DispatchError> {
        let key = request.key();
        debug!(method = %key.method, url = %key.url, "Forwarding without interception");

        self.transport
            .fetch(&key)
            .await
            .map(Resolved::network)
            .map_err(|source| DispatchError::OriginUnreachable {
                url: key.url.clone(),
                source,
            })
    }

    /// Network attempt first; cache, then synthesized fallback, on failure
    async fn network_first(
        &self,
        request: &FetchRequest,
        classification: RequestClassification,
    ) -> Result<Resolved, DispatchError> {
        let key = request.key();

        match self.transport.fetch(&key).await {
            Ok(snapshot) => {
                // Any HTTP response is forwarded as-is; only 2xx is written
                // through, and never on the response's critical path
                if snapshot.is_success() {
                    self.write_through(key, snapshot.clone());
                }
                Ok(Resolved::network(snapshot))
            }
            Err(e) => {
                debug!(url = %key.url, error = %e, "Network failed, consulting cache");

                if let Some(entry) = self.store.get(&key) {
                    return Ok(Resolved::cached(entry.snapshot));
                }

                if classification == RequestClassification::Navigation {
                    let shell_key = RequestKey::get(&self.shell_root);
                    if let Some(entry) = self.store.get(&shell_key) {
                        debug!(url = %key.url, "Serving precached shell for offline navigation");
                        return Ok(Resolved::cached(entry.snapshot));
                    }
                    return Ok(Resolved::fallback(fallback::offline_page()));
                }

                Ok(Resolved::fallback(fallback::offline_api_response()))
            }
        }
    }

    /// Cached snapshot immediately, refreshed in the background; network
    /// only on a miss, and a miss with no network fails loudly
    async fn cache_first(&self, request: &FetchRequest) -> Result<Resolved, DispatchError> {
        let key = request.key();

        if let Some(entry) = self.store.get(&key) {
            self.spawn_revalidate(key);
            return Ok(Resolved::cached(entry.snapshot));
        }

        match self.transport.fetch(&key).await {
            Ok(snapshot) => {
                if snapshot.is_success() {
                    self.store.put(&key, snapshot.clone());
                }
                Ok(Resolved::network(snapshot))
            }
            Err(source) => Err(DispatchError::AssetUnavailable {
                url: key.url.clone(),
                source,
            }),
        }
    }

    /// Write-through on a detached task so the in-flight response is never
    /// delayed; the write completes even if the caller goes away
    fn write_through(&self, key: RequestKey, snapshot: ResponseSnapshot) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            store.put(&key, snapshot);
        });
    }

    /// Stale-while-revalidate refresh; failures are logged and swallowed
    fn spawn_revalidate(&self, key: RequestKey) {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            match transport.fetch(&key).await {
                Ok(snapshot) if snapshot.is_success() => {
                    store.put(&key, snapshot);
                    debug!(url = %key.url, "Background refresh updated cache");
                }
                Ok(snapshot) => {
                    debug!(
                        url = %key.url,
                        status = snapshot.status,
                        "Background refresh returned error status"
                    );
                }
                Err(e) => {
                    debug!(url = %key.url, error = %e, "Background refresh failed");
                }
            }
        });
    }
}
