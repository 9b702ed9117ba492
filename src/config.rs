//! Gateway Configuration
//!
//! JSON config file describing the origin, the cache version, the precache
//! list, and the classification rules. Every field has a default so a
//! partial file works; a missing file falls back to the defaults entirely.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ipc::protocol::SOCKET_PATH;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Absolute base URL of the remote origin
    pub origin_url: String,
    /// Cache region version; bumping it rotates regions at next start
    pub cache_version: String,
    /// App shell routes and entry points fetched at install time
    pub precache: Vec<String>,
    /// API path prefixes that stay network-first
    pub api_patterns: Vec<String>,
    /// Precached shell document served to offline navigations
    pub shell_root: String,
    /// Notification action ids mapped to application routes
    pub action_routes: HashMap<String, String>,
    /// Unix socket path application instances connect to
    pub socket_path: PathBuf,
    /// Cache region root; platform cache directory when unset
    pub cache_dir: Option<PathBuf>,
    /// Deferred task queue file; platform data directory when unset
    pub queue_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut action_routes = HashMap::new();
        action_routes.insert("explore".to_string(), "/".to_string());

        Self {
            origin_url: "http://127.0.0.1:8080".to_string(),
            cache_version: "v1".to_string(),
            precache: vec!["/".to_string()],
            api_patterns: vec!["/api/".to_string()],
            shell_root: "/".to_string(),
            action_routes,
            socket_path: PathBuf::from(SOCKET_PATH),
            cache_dir: None,
            queue_path: None,
        }
    }
}

impl GatewayConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;

        info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Resolve the config: an explicit path must load; otherwise the default
    /// path is used if present, and the built-in defaults if not
    pub fn resolve(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load(&path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    info!("No config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Default config path under the platform config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("offgate")
            .join("config.json")
    }

    /// Sanity checks on the loaded values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.origin_url)
            .with_context(|| format!("originUrl is not an absolute URL: {}", self.origin_url))?;
        ensure!(!self.cache_version.is_empty(), "cacheVersion must not be empty");
        ensure!(!self.shell_root.is_empty(), "shellRoot must not be empty");
        Ok(())
    }
}
