//! Deferred mutation replay

pub mod queue;

pub use queue::{sync_event_type, DeferredTask, DeferredTaskQueue, ReplayOutcome};
