//! Offline Fallback Synthesizer
//!
//! Substitute responses for when both the network and the cache come up
//! empty. Data requests get a structured JSON 503 so the application can
//! tell "network unavailable" from "no data"; navigations get a
//! self-contained notice page. Static assets get nothing: a missing script
//! or image fails loudly.

use serde_json::json;

use crate::store::ResponseSnapshot;

/// HTTP-equivalent status for synthesized offline responses
pub const OFFLINE_STATUS: u16 = 503;

/// Offline notice page. Everything is inlined; the page must render with no
/// cached or network resource available at all.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
  body { font-family: -apple-system, system-ui, sans-serif; background: #f5f6f8;
         display: flex; align-items: center; justify-content: center;
         height: 100vh; margin: 0; color: #2d3436; }
  .notice { text-align: center; padding: 2rem; }
  h1 { font-size: 1.4rem; margin-bottom: 0.5rem; }
  p { color: #636e72; margin-bottom: 1.5rem; }
  button { background: #0984e3; color: #fff; border: none; border-radius: 6px;
           padding: 0.6rem 1.4rem; font-size: 1rem; cursor: pointer; }
</style>
</head>
<body>
<div class="notice">
  <h1>You are offline</h1>
  <p>This page is not available without a connection.</p>
  <button onclick="window.location.reload()">Retry</button>
</div>
</body>
</html>
"#;

/// Structured JSON 503 for api-pattern and other data requests
pub fn offline_api_response() -> ResponseSnapshot {
    let body = json!({
        "error": "offline",
        "message": "The network is unavailable and no cached data exists for this request.",
    })
    .to_string()
    .into_bytes();

    ResponseSnapshot {
        status: OFFLINE_STATUS,
        headers: vec![(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        )],
        body,
    }
}

/// Self-contained offline notice page for navigations
pub fn offline_page() -> ResponseSnapshot {
    ResponseSnapshot {
        status: OFFLINE_STATUS,
        headers: vec![(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )],
        body: OFFLINE_PAGE.as_bytes().to_vec(),
    }
}
