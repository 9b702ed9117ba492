//! Durable response cache
//!
//! Named, versioned cache regions with a moka in-memory front over
//! atomically-written disk entries. Exactly one region is current at a time;
//! activation purges the rest.

pub mod entry;
pub mod regions;

pub use entry::{unix_now, CacheEntry, RequestKey, ResponseSnapshot};
pub use regions::RegionStore;

use std::path::PathBuf;

/// Cache store errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A precache fetch failed; the install is aborted as a whole
    #[error("precache fetch failed for {url}: {reason}")]
    Precache { url: String, reason: String },

    /// Region directory or entry file could not be read/written
    #[error("cache io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
