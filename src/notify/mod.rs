//! Push notification display and action routing

pub mod dispatcher;

pub use dispatcher::{NavigationIntent, NotificationDispatcher, NotificationPayload};
