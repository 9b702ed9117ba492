//! Request interception: classification, strategies, offline fallbacks

pub mod classify;
pub mod fallback;
pub mod strategy;

pub use classify::{Classifier, FetchRequest, RequestClassification};
pub use strategy::{DispatchError, Resolved, ResponseSource, StrategyDispatcher};
