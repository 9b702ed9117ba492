//! Notification Dispatcher
//!
//! Renders inbound push payloads to every connected application instance
//! and routes notification action clicks back into the application. A
//! payload that fails to parse still produces a notification with default
//! title and body instead of disappearing silently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ipc::protocol::Event;

/// One actionable button on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    /// Action identifier routed back via the action command
    pub id: String,
    /// Button label
    pub label: String,
}

/// Inbound push payload; every field is optional on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    /// Opaque payload data carried through to action handling
    #[serde(default)]
    pub data: serde_json::Value,
}

fn default_title() -> String {
    "Notification".to_string()
}

fn default_body() -> String {
    "You have an update.".to_string()
}

impl NotificationPayload {
    /// Parse a raw push payload, falling back to defaults on malformed input
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Unparseable push payload, using defaults");
                Self {
                    title: default_title(),
                    body: default_body(),
                    actions: Vec::new(),
                    data: serde_json::Value::Null,
                }
            }
        }
    }
}

/// Application route to open in response to a notification action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub route: String,
}

/// Routes push payloads out and action clicks back in
pub struct NotificationDispatcher {
    /// Known action ids mapped to application routes
    routes: HashMap<String, String>,
}

impl NotificationDispatcher {
    pub fn new(routes: HashMap<String, String>) -> Self {
        Self { routes }
    }

    /// Parse and display a push payload to all connected instances
    pub fn display(&self, raw: &str, events: &broadcast::Sender<Event>) -> NotificationPayload {
        let payload = NotificationPayload::parse(raw);
        debug!(title = %payload.title, "Displaying notification");

        let rendered = serde_json::to_value(&payload).unwrap_or_default();
        // Receiver-less send just means no instance is connected
        let _ = events.send(Event::Notification { payload: rendered });

        payload
    }

    /// Resolve a clicked action to a navigation intent
    ///
    /// A `route` string in the payload's data wins over the configured map
    /// so the push sender can deep-link. Unknown ids (including the implicit
    /// dismiss) resolve to None and the notification simply closes.
    pub fn handle_action(
        &self,
        action_id: &str,
        payload: &NotificationPayload,
    ) -> Option<NavigationIntent> {
        if let Some(route) = payload.data.get("route").and_then(|v| v.as_str()) {
            if self.routes.contains_key(action_id) {
                return Some(NavigationIntent {
                    route: route.to_string(),
                });
            }
        }

        match self.routes.get(action_id) {
            Some(route) => Some(NavigationIntent {
                route: route.clone(),
            }),
            None => {
                debug!(action = action_id, "Unknown notification action, dismissing");
                None
            }
        }
    }
}
