//! Cache entry types
//!
//! Request identity and response snapshots as stored in cache regions.
//! Persisted entries are JSON with base64-encoded bodies.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Normalized request identity: (method, url)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestKey {
    /// HTTP method, uppercased
    pub method: String,
    /// Request URL (path-with-query or absolute)
    pub url: String,
}

impl RequestKey {
    /// Create a key, normalizing the method to uppercase
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Shorthand for a GET key (the common case for cacheable requests)
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    /// Stable digest used as the on-disk entry filename
    pub fn digest(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Captured response: status, headers, body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// HTTP status code
    pub status: u16,
    /// Response headers as (name, value) pairs
    pub headers: Vec<(String, String)>,
    /// Response body, base64-encoded when persisted
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A cached response snapshot with its request identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The request this entry answers
    pub key: RequestKey,
    /// The captured response
    pub snapshot: ResponseSnapshot,
    /// Unix timestamp (seconds) when the entry was stored
    pub stored_at: u64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: RequestKey, snapshot: ResponseSnapshot) -> Self {
        Self {
            key,
            snapshot,
            stored_at: unix_now(),
        }
    }
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Serde helper: Vec<u8> as a base64 string
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
