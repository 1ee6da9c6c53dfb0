//! Network transport used by the update pipeline.
//!
//! [`Transport`] is the seam between the pipeline and the network: the
//! production [`HttpTransport`] wraps a `reqwest` client, tests substitute an
//! in-memory implementation. Every failure is reported as
//! [`UpdateError::Network`], the only retryable error kind.

use std::future::Future;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use crate::core::{Result, UpdateError};

/// Body chunks of a streamed response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A response whose body has not been read yet.
pub struct StreamedResponse {
    /// Size hint from the `Content-Length` header, if any.
    pub content_length: Option<u64>,
    /// The body, chunk by chunk.
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Fetches resources over the network.
pub trait Transport: Send + Sync {
    /// Fetch a small resource as text.
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    /// Start fetching a resource and return its body as a stream.
    fn get_stream(&self, url: &str) -> impl Future<Output = Result<StreamedResponse>> + Send;
}

/// [`Transport`] over HTTP(S).
///
/// Each request is bounded: connecting and every individual read are subject
/// to the configured timeout, and text fetches have a total deadline of the
/// same length. A stalled download therefore fails instead of hanging.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| UpdateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            timeout,
        })
    }

    async fn send(&self, url: &str, total_timeout: Option<Duration>) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(timeout) = total_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| network_error(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network {
                url: url.to_string(),
                reason: format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown error")
                ),
            });
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(url, Some(self.timeout)).await?;
        response.text().await.map_err(|e| network_error(url, &e))
    }

    async fn get_stream(&self, url: &str) -> Result<StreamedResponse> {
        let response = self.send(url, None).await?;
        let content_length = response.content_length();
        let owned_url = url.to_string();

        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| network_error(&owned_url, &e))
            })
            .boxed();

        Ok(StreamedResponse {
            content_length,
            body,
        })
    }
}

fn network_error(url: &str, err: &reqwest::Error) -> UpdateError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };

    UpdateError::Network {
        url: url.to_string(),
        reason,
    }
}
