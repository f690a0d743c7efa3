use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations.
///
/// Every variant is a transport-level failure: a reachable backend that
/// answers with an error status is *not* an error here — its response is
/// returned as-is and passed through to the caller.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to backend fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to backends
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward an HTTP request to a backend server and return its response
    /// verbatim. Errors only on transport-level failure.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Probe a backend's liveness endpoint with a bounded timeout.
    ///
    /// Returns `Ok(true)` for a successful response, `Ok(false)` for a
    /// non-success status or connection failure; timeouts surface as
    /// [`HttpClientError::Timeout`]. Callers treat anything but `Ok(true)`
    /// as the backend being down.
    async fn health_check(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool>;
}
