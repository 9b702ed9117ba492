//! Origin transport trait
//!
//! The seam between the caching strategies and the real HTTP client.
//! Tests substitute in-memory transports; production uses `OriginClient`.

use std::future::Future;

use crate::store::{RequestKey, ResponseSnapshot};

use super::errors::OriginError;

/// Fetch primitive for the remote origin.
///
/// Futures are `Send` so strategies can run fetches on spawned tasks
/// (background write-through and revalidation).
pub trait OriginTransport: Send + Sync + 'static {
    /// Fetch a request from the origin and snapshot the full response.
    ///
    /// Returns `Ok` for any HTTP response regardless of status; `Err` only
    /// for transport-level failures (connect, DNS, timeout).
    fn fetch(
        &self,
        key: &RequestKey,
    ) -> impl Future<Output = Result<ResponseSnapshot, OriginError>> + Send;

    /// Fetch bypassing any intermediate HTTP cache. Used by precache so the
    /// stored app shell is never a stale copy.
    fn fetch_fresh(
        &self,
        key: &RequestKey,
    ) -> impl Future<Output = Result<ResponseSnapshot, OriginError>> + Send;

    /// POST a deferred mutation payload back to its original endpoint.
    fn replay(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<ResponseSnapshot, OriginError>> + Send;
}
