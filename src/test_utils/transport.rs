//! A scripted, in-memory [`Transport`].

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::{Result, UpdateError};
use crate::upgrade::transport::{StreamedResponse, Transport};

const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Default, Clone)]
struct Route {
    body: Vec<u8>,
    fail_first: usize,
    truncate_at: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<String, Route>,
    requests: HashMap<String, usize>,
}

/// Serves fixed bodies per URL and records how often each was requested.
///
/// Unknown URLs fail with [`UpdateError::Network`] as a 404 would.
///
/// ```rust,ignore
/// let transport = FakeTransport::new()
///     .with_text("https://example.com/version.txt", "1.1.0")
///     .with_file("https://example.com/app-linux.tar.gz", archive_bytes)
///     .failing_first("https://example.com/app-linux.tar.gz", 2);
/// ```
#[derive(Debug, Default)]
pub struct FakeTransport {
    state: Mutex<State>,
}

impl FakeTransport {
    /// A transport that knows no URLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    pub fn with_file(self, url: &str, body: Vec<u8>) -> Self {
        self.route(url, |route| route.body = body);
        self
    }

    /// Serve `text` at `url`.
    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.with_file(url, text.as_bytes().to_vec())
    }

    /// Fail the first `count` requests to `url` before the response starts.
    pub fn failing_first(self, url: &str, count: usize) -> Self {
        self.route(url, |route| route.fail_first = count);
        self
    }

    /// Drop the connection after `bytes` bytes of every response from `url`.
    pub fn truncating_body(self, url: &str, bytes: usize) -> Self {
        self.route(url, |route| route.truncate_at = Some(bytes));
        self
    }

    /// Number of requests made to `url` so far.
    pub fn request_count(&self, url: &str) -> usize {
        self.state.lock().expect("transport state").requests.get(url).copied().unwrap_or(0)
    }

    fn route(&self, url: &str, edit: impl FnOnce(&mut Route)) {
        let mut state = self.state.lock().expect("transport state");
        edit(state.routes.entry(url.to_string()).or_default());
    }

    /// Record a request and return the route to serve, or the failure.
    fn request(&self, url: &str) -> Result<Route> {
        let mut state = self.state.lock().expect("transport state");
        let count = {
            let count = state.requests.entry(url.to_string()).or_default();
            *count += 1;
            *count
        };

        let failure = |reason: &str| UpdateError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let route = state.routes.get(url).ok_or_else(|| failure("HTTP 404 Not Found"))?;
        if count <= route.fail_first {
            return Err(failure("connection reset"));
        }
        Ok(route.clone())
    }
}

impl Transport for FakeTransport {
    async fn get_text(&self, url: &str) -> Result<String> {
        let route = self.request(url)?;
        String::from_utf8(route.body).map_err(|e| UpdateError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_stream(&self, url: &str) -> Result<StreamedResponse> {
        let route = self.request(url)?;
        let content_length = Some(route.body.len() as u64);

        let served = route.truncate_at.map_or(route.body.len(), |n| n.min(route.body.len()));
        let mut chunks: Vec<Result<Vec<u8>>> =
            route.body[..served].chunks(CHUNK_SIZE).map(|chunk| Ok(chunk.to_vec())).collect();
        if route.truncate_at.is_some() {
            chunks.push(Err(UpdateError::Network {
                url: url.to_string(),
                reason: "connection closed before message completed".to_string(),
            }));
        }

        Ok(StreamedResponse {
            content_length,
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
