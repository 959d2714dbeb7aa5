//! HTTP transport seam.
//!
//! [`Transport`] performs exactly one GET per call and never retries;
//! retry policy lives in [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use ureq::Agent;

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Last-Modified` header, if any.
    pub last_modified: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            last_modified: None,
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Connection-level failure: no HTTP response was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Single-shot HTTP GET.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one GET, optionally with an `Authorization` header value.
    async fn get(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// [`Transport`] backed by a blocking `ureq` agent.
///
/// Requests run on tokio's blocking pool so a slow server never stalls
/// unrelated tasks.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT))
    }
}

impl UreqTransport {
    /// Create a transport with a global per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn get(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let url = url.to_owned();
        let authorization = authorization.map(str::to_owned);

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            if let Some(value) = &authorization {
                request = request.header("Authorization", value);
            }
            let response = request
                .call()
                .map_err(|e| TransportError(e.to_string()))?;

            let status = response.status().as_u16();
            let last_modified = response
                .headers()
                .get("last-modified")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response
                .into_body()
                .read_to_vec()
                .map_err(|e| TransportError(e.to_string()))?;

            Ok(HttpResponse {
                status,
                last_modified,
                body,
            })
        })
        .await
        .map_err(|e| TransportError(format!("request task failed: {e}")))?
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockTransport, RecordedCall};

#[cfg(any(test, feature = "mock"))]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::{HttpResponse, Transport, TransportError};

    /// One request observed by [`MockTransport`].
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        /// Requested URL.
        pub url: String,
        /// `Authorization` header sent, if any.
        pub authorization: Option<String>,
        /// Tokio clock reading when the call arrived.
        pub at: Instant,
    }

    /// Scripted transport for tests.
    ///
    /// Each URL owns a queue of outcomes consumed in order; the last outcome
    /// repeats once the queue is down to one entry. Unscripted URLs answer 404.
    #[derive(Default)]
    pub struct MockTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a response to the script for `url`.
        #[must_use]
        pub fn respond(self, url: &str, response: HttpResponse) -> Self {
            self.push(url, Ok(response));
            self
        }

        /// Append a connection failure to the script for `url`.
        #[must_use]
        pub fn fail(self, url: &str, message: &str) -> Self {
            self.push(url, Err(TransportError(message.to_owned())));
            self
        }

        fn push(&self, url: &str, outcome: Result<HttpResponse, TransportError>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(url.to_owned())
                .or_default()
                .push_back(outcome);
        }

        /// Every call made so far, in arrival order.
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls made to one URL.
        pub fn calls_to(&self, url: &str) -> Vec<RecordedCall> {
            self.calls()
                .into_iter()
                .filter(|c| c.url == url)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(
            &self,
            url: &str,
            authorization: Option<&str>,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(RecordedCall {
                url: url.to_owned(),
                authorization: authorization.map(str::to_owned),
                at: Instant::now(),
            });

            let mut scripts = self.scripts.lock().unwrap();
            let Some(queue) = scripts.get_mut(url) else {
                return Ok(HttpResponse::new(404, "not found"));
            };
            if queue.len() > 1 {
                queue.pop_front().unwrap_or_else(|| Ok(HttpResponse::new(404, "")))
            } else {
                queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Ok(HttpResponse::new(404, "")))
            }
        }
    }
}
