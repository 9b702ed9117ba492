//! Request Classifier
//!
//! Assigns every intercepted request a handling category. Pure and
//! deterministic: classification is derived from method, URL path, and
//! resource destination, and is recomputed per request, never stored.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::store::RequestKey;

/// Wire form of an intercepted request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// HTTP method; defaults to GET
    #[serde(default = "default_method")]
    pub method: String,
    /// Request URL (path-with-query or absolute)
    pub url: String,
    /// Request mode; "navigate" marks a full-page navigation
    #[serde(default)]
    pub mode: Option<String>,
    /// Resource destination ("script", "style", "image", ...)
    #[serde(default)]
    pub destination: Option<String>,
    /// Whether the request targets a different origin
    #[serde(default)]
    pub cross_origin: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchRequest {
    /// Cache identity for this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_navigation(&self) -> bool {
        self.mode.as_deref() == Some("navigate")
    }

    /// Path component of the URL, absolute or relative
    pub fn path(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => url.path().to_string(),
            // Relative URL: strip query and fragment by hand
            Err(_) => {
                let end = self
                    .url
                    .find(['?', '#'])
                    .unwrap_or(self.url.len());
                self.url[..end].to_string()
            }
        }
    }
}

/// Handling category for an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClassification {
    /// Part of the precached application shell
    PrecacheShell,
    /// Matches a configured API path pattern
    ApiPattern,
    /// Full-page navigation
    Navigation,
    /// Script, style, or image
    StaticAsset,
    /// Everything else, including mutations and cross-origin probes
    Other,
}

/// Classifies requests against the configured API patterns and precache list
pub struct Classifier {
    /// API path-prefix patterns
    api_patterns: Vec<String>,
    /// Paths belonging to the precached app shell
    precache: HashSet<String>,
}

impl Classifier {
    pub fn new(api_patterns: Vec<String>, precache: &[String]) -> Self {
        Self {
            api_patterns,
            precache: precache.iter().cloned().collect(),
        }
    }

    /// Classify a request. Rules in priority order:
    ///
    /// 1. Mutations and cross-origin probes are never intercepted
    /// 2. API patterns outrank everything cacheable, so data freshness is
    ///    never lost to a broad asset rule
    /// 3. Precached shell membership
    /// 4. Full-page navigations
    /// 5. Script/style/image destinations
    /// 6. Everything else, handled network-first as the safe default
    pub fn classify(&self, request: &FetchRequest) -> RequestClassification {
        if !request.is_get() || request.cross_origin {
            return RequestClassification::Other;
        }

        let path = request.path();

        if self.api_patterns.iter().any(|p| path.starts_with(p.as_str())) {
            return RequestClassification::ApiPattern;
        }

        if self.precache.contains(&path) {
            return RequestClassification::PrecacheShell;
        }

        if request.is_navigation() {
            return RequestClassification::Navigation;
        }

        if matches!(
            request.destination.as_deref(),
            Some("script") | Some("style") | Some("image")
        ) {
            return RequestClassification::StaticAsset;
        }

        RequestClassification::Other
    }
}
