//! Versioned Cache Regions
//!
//! One disk directory per region, named by cache version, with a moka
//! in-memory front. Exactly one region is current; siblings left behind by
//! older versions are deleted during activation. Entry files are written
//! atomically so a crash never leaves a half-written snapshot behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use moka::sync::Cache;
use tracing::{debug, info, warn};

use crate::origin::OriginTransport;

use super::entry::{CacheEntry, RequestKey, ResponseSnapshot};
use super::CacheError;

/// A single named cache region backed by a disk directory
struct CacheRegion {
    /// Region name (the cache version string)
    name: String,
    /// Directory holding persisted entry files
    dir: PathBuf,
    /// In-memory front over the disk entries
    entries: Cache<RequestKey, CacheEntry>,
}

impl CacheRegion {
    /// Open or create the region directory under `root`
    fn open(root: &Path, name: &str) -> Result<Self, CacheError> {
        let dir = root.join(name);
        fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let region = Self {
            name: name.to_string(),
            dir,
            entries: Cache::builder().name("response_cache").build(),
        };

        // Clean up any stale temp files from interrupted writes
        region.cleanup();

        Ok(region)
    }

    /// Remove leftover .tmp files from previous runs
    fn cleanup(&self) {
        if let Ok(read_dir) = fs::read_dir(&self.dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    /// On-disk path for a request key
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// Look up an entry, falling back from memory to disk
    fn get(&self, key: &RequestKey) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry);
        }

        let entry = self.load_from_disk(key)?;
        self.entries.insert(key.clone(), entry.clone());
        Some(entry)
    }

    /// Read and parse a persisted entry file
    fn load_from_disk(&self, key: &RequestKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let data = fs::read(&path).ok()?;

        match serde_json::from_slice(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cache entry");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Upsert an entry; refuses non-2xx snapshots
    fn put(&self, key: &RequestKey, snapshot: ResponseSnapshot) {
        if !snapshot.is_success() {
            debug!(
                url = %key.url,
                status = snapshot.status,
                "Not caching non-2xx response"
            );
            return;
        }

        let entry = CacheEntry::new(key.clone(), snapshot);
        if let Err(e) = self.persist(&entry) {
            warn!(url = %key.url, error = %e, "Failed to persist cache entry");
        }
        self.entries.insert(key.clone(), entry);
        debug!(url = %key.url, "Stored response in cache");
    }

    /// Write an entry file atomically via a temp file in the same directory
    fn persist(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.key);
        let io_err = |e: std::io::Error| CacheError::Io {
            path: path.clone(),
            source: e,
        };

        let data = serde_json::to_vec(entry).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let mut tmp = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        Ok(())
    }

    /// Count persisted entries (the durable truth, not the moka front)
    fn entry_count(&self) -> u64 {
        fs::read_dir(&self.dir)
            .map(|read_dir| {
                read_dir
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count() as u64
            })
            .unwrap_or(0)
    }
}

/// Cache store manager: owns the region root and the current region
///
/// The only shared mutable resource in the gateway. `get`/`put` are safe
/// under concurrent invocation; last-write-wins comes from moka's atomic
/// per-key insert and the atomic file rename underneath.
pub struct RegionStore {
    /// Root directory containing one subdirectory per region
    root: PathBuf,
    /// The current (and only valid) region
    current: CacheRegion,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl RegionStore {
    /// Open the store, creating the current region if needed
    ///
    /// # Arguments
    /// * `root` - Directory holding all region directories
    /// * `version` - Name of the current region
    pub fn open(root: PathBuf, version: &str) -> Result<Self, CacheError> {
        let current = CacheRegion::open(&root, version)?;

        info!(
            root = %root.display(),
            version = version,
            "Cache store opened"
        );

        Ok(Self {
            root,
            current,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Default region root under the platform cache directory
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("offgate")
    }

    /// Populate the current region from the precache list, all-or-nothing
    ///
    /// Every URL is fetched with cache-bypass headers. Responses are staged
    /// in memory and committed only after the whole list succeeded, so a
    /// failing entry leaves the region unchanged and the caller aborts
    /// activation.
    pub async fn initialize<T: OriginTransport>(
        &self,
        precache: &[String],
        transport: &T,
    ) -> Result<(), CacheError> {
        let mut staged = Vec::with_capacity(precache.len());

        for url in precache {
            let key = RequestKey::get(url);
            match transport.fetch_fresh(&key).await {
                Ok(snapshot) if snapshot.is_success() => {
                    staged.push((key, snapshot));
                }
                Ok(snapshot) => {
                    return Err(CacheError::Precache {
                        url: url.clone(),
                        reason: format!("status {}", snapshot.status),
                    });
                }
                Err(e) => {
                    return Err(CacheError::Precache {
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (key, snapshot) in staged {
            self.current.put(&key, snapshot);
        }

        info!(
            count = precache.len(),
            version = %self.current.name,
            "Precache complete"
        );
        Ok(())
    }

    /// Delete every region whose name differs from `current_version`
    ///
    /// Runs at activation. Idempotent: a second call finds nothing to
    /// remove. Returns the number of regions deleted.
    pub fn purge_stale(&self, current_version: &str) -> usize {
        let mut removed = 0;

        if let Ok(read_dir) = fs::read_dir(&self.root) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                if name.to_string_lossy() == current_version {
                    continue;
                }

                match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        info!(region = %name.to_string_lossy(), "Purged stale cache region");
                        removed += 1;
                    }
                    Err(e) => {
                        warn!(
                            region = %name.to_string_lossy(),
                            error = %e,
                            "Failed to purge stale cache region"
                        );
                    }
                }
            }
        }

        removed
    }

    /// Pure lookup; never touches the network
    pub fn get(&self, key: &RequestKey) -> Option<CacheEntry> {
        match self.current.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(url = %key.url, "Cache HIT");
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(url = %key.url, "Cache MISS");
                None
            }
        }
    }

    /// Upsert a response snapshot; non-2xx snapshots are refused
    pub fn put(&self, key: &RequestKey, snapshot: ResponseSnapshot) {
        self.current.put(key, snapshot);
    }

    /// Name of the current region
    pub fn version(&self) -> &str {
        &self.current.name
    }

    /// Number of persisted entries in the current region
    pub fn entry_count(&self) -> u64 {
        self.current.entry_count()
    }

    /// Number of region directories on disk
    pub fn region_count(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|read_dir| read_dir.flatten().filter(|e| e.path().is_dir()).count())
            .unwrap_or(0)
    }

    /// Hit/miss counters
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
