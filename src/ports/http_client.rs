use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for outbound HTTP operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when a request does not complete in time
    #[error("Timeout error after {0:?}")]
    Timeout(Duration),

    /// Error when the request cannot be built or sent as is
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for talking to upstreams and
/// probing freshly bound listeners.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward a fully rewritten request to its upstream.
    ///
    /// # Arguments
    /// * `req` - The request whose URI already points at the upstream
    ///
    /// # Returns
    /// The upstream response, or an error if the upstream could not be reached
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Issue a `GET` against `url` bounded by `timeout`.
    ///
    /// Returns `Ok(true)` only for a 2xx answer. Connection failures map to
    /// `Ok(false)`; running out of time maps to [`HttpClientError::Timeout`].
    async fn probe(&self, url: &str, timeout: Duration) -> HttpClientResult<bool>;
}
