//! Gateway wire protocol
//!
//! Newline-delimited JSON over the Unix socket. Application instances send
//! commands and read responses; unsolicited events (sync completions, push
//! notifications) are broadcast to every connected instance on the same
//! stream.

use serde::{Deserialize, Serialize};

use crate::intercept::{FetchRequest, ResponseSource};
use crate::store::ResponseSnapshot;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Default socket path for gateway communication
pub const SOCKET_PATH: &str = "/tmp/offgate.sock";

/// Commands sent from application instances to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Intercepted request to resolve via cache strategy
    Fetch(FetchRequest),
    /// Register a mutation that could not reach the origin
    #[serde(rename_all = "camelCase")]
    Enqueue {
        /// Sync tag grouping related mutations
        tag: String,
        /// Original endpoint to replay against
        url: String,
        /// Mutation body
        payload: serde_json::Value,
    },
    /// Connectivity restored for a sync tag; replay its deferred tasks
    #[serde(rename_all = "camelCase")]
    Connectivity {
        /// Sync tag to drain
        tag: String,
    },
    /// Inbound push payload to display
    #[serde(rename_all = "camelCase")]
    Push {
        /// Raw payload text; parsed leniently with defaults
        payload: String,
    },
    /// A notification action was clicked
    #[serde(rename_all = "camelCase")]
    Action {
        /// Action identifier (e.g. "explore", "close")
        action_id: String,
        /// Raw payload of the notification the action belongs to
        #[serde(default)]
        payload: Option<String>,
    },
    /// Get gateway status
    GetStatus,
}

/// Responses sent from the gateway to application instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Resolved response for a fetch command
    #[serde(rename_all = "camelCase")]
    Fetched {
        /// Where the response came from
        source: ResponseSource,
        /// The response itself
        #[serde(flatten)]
        snapshot: ResponseSnapshot,
    },
    /// Success response
    #[serde(rename_all = "camelCase")]
    Success {
        /// Optional success message
        message: Option<String>,
    },
    /// Error response
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error message
        error: String,
    },
    /// Navigation intent resolved from a notification action
    #[serde(rename_all = "camelCase")]
    Navigate {
        /// Application route to open; None dismisses with no effect
        route: Option<String>,
    },
    /// Status response with gateway state
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Current cache region version
        cache_version: String,
        /// Persisted entries in the current region
        entry_count: u64,
        /// Deferred tasks waiting for a connectivity signal
        pending_tasks: usize,
        /// Cache hit counter
        hits: u64,
        /// Cache miss counter
        misses: u64,
    },
}

/// Unsolicited events broadcast to all connected instances
#[derive(Debug, Clone)]
pub enum Event {
    /// A deferred task replayed successfully.
    /// Serialized as `{"type":"<DOMAIN>_SYNCED"}`.
    Synced {
        /// Derived event name, e.g. "TRANSACTIONS_SYNCED"
        event_type: String,
    },
    /// A push notification to display
    Notification {
        /// Rendered notification payload
        payload: serde_json::Value,
    },
}

impl Event {
    /// Wire form of the event
    pub fn to_message(&self) -> serde_json::Value {
        match self {
            Event::Synced { event_type } => serde_json::json!({ "type": event_type }),
            Event::Notification { payload } => serde_json::json!({
                "type": "notification",
                "notification": payload,
            }),
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes with the newline delimiter
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    Ok(json)
}

/// Serialize an event to JSON bytes with the newline delimiter
pub fn serialize_event(event: &Event) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(&event.to_message())?;
    json.push(b'\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_command() {
        let json = r#"{"type":"fetch","method":"GET","url":"/api/transactions","mode":"navigate"}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        match cmd {
            Command::Fetch(request) => {
                assert_eq!(request.method, "GET");
                assert_eq!(request.url, "/api/transactions");
                assert!(request.is_navigation());
                assert!(!request.cross_origin);
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_parse_fetch_defaults_method_to_get() {
        let json = r#"{"type":"fetch","url":"/login"}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        match cmd {
            Command::Fetch(request) => assert_eq!(request.method, "GET"),
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_parse_enqueue_command() {
        let json = r#"{"type":"enqueue","tag":"sync-transactions","url":"/api/transactions","payload":{"amount":12}}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        match cmd {
            Command::Enqueue { tag, url, payload } => {
                assert_eq!(tag, "sync-transactions");
                assert_eq!(url, "/api/transactions");
                assert_eq!(payload["amount"], 12);
            }
            _ => panic!("Expected Enqueue command"),
        }
    }

    #[test]
    fn test_parse_connectivity_command() {
        let json = r#"{"type":"connectivity","tag":"sync-transactions"}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        match cmd {
            Command::Connectivity { tag } => assert_eq!(tag, "sync-transactions"),
            _ => panic!("Expected Connectivity command"),
        }
    }

    #[test]
    fn test_parse_get_status_command() {
        let json = r#"{"type":"getStatus"}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        assert!(matches!(cmd, Command::GetStatus));
    }

    #[test]
    fn test_serialize_fetched_response_flattens_snapshot() {
        let response = Response::Fetched {
            source: ResponseSource::Cache,
            snapshot: ResponseSnapshot {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: b"{}".to_vec(),
            },
        };
        let json = serialize_response(&response).unwrap();
        let json_str = String::from_utf8(json).unwrap();
        assert!(json_str.contains(r#""type":"fetched""#));
        assert!(json_str.contains(r#""source":"cache""#));
        assert!(json_str.contains(r#""status":200"#));
        assert!(json_str.ends_with('\n'));
    }

    #[test]
    fn test_serialize_error_response() {
        let response = Response::Error {
            error: "static asset unavailable".to_string(),
        };
        let json = serialize_response(&response).unwrap();
        let json_str = String::from_utf8(json).unwrap();
        assert!(json_str.contains("error"));
        assert!(json_str.contains("static asset unavailable"));
    }

    #[test]
    fn test_synced_event_wire_shape() {
        let event = Event::Synced {
            event_type: "TRANSACTIONS_SYNCED".to_string(),
        };
        let json = serialize_event(&event).unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            "{\"type\":\"TRANSACTIONS_SYNCED\"}\n"
        );
    }

    #[test]
    fn test_notification_event_wire_shape() {
        let event = Event::Notification {
            payload: serde_json::json!({"title": "Budget alert"}),
        };
        let value = event.to_message();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["notification"]["title"], "Budget alert");
    }
}
