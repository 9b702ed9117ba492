//! Origin fetch error types
//!
//! Transport-level failures only: an HTTP response with an error status is
//! still a response and is forwarded to the caller, never mapped here. The
//! strategy layer treats every variant uniformly as "network failure".

/// Errors from the origin fetch primitive
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout")]
    Timeout,

    #[error("request could not be built: {0}")]
    Request(String),
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OriginError::Timeout
        } else if err.is_builder() || err.is_request() {
            OriginError::Request(err.to_string())
        } else {
            OriginError::Network(err.to_string())
        }
    }
}
