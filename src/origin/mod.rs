//! Remote origin HTTP client

pub mod client;
pub mod errors;
pub mod transport;

pub use client::OriginClient;
pub use errors::OriginError;
pub use transport::OriginTransport;
