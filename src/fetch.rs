//! Resilient network fetches for command handlers.
//!
//! A fetch retries transient failures (connection resets and a fixed set of
//! HTTP statuses) with the shared golden-ratio backoff, up to a bounded
//! number of attempts. Anything else fails fast.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::backoff::Backoff;

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUSES: [u16; 5] = [408, 500, 502, 503, 504];

/// Default attempt budget per fetch.
pub const DEFAULT_TRIES: u32 = 10;

/// Request timeout for the HTTP transport.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A complete response from the transport, whatever its status.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, unmodified.
    pub body: Vec<u8>,
    /// Response header mapping.
    pub headers: HashMap<String, String>,
}

/// The transport could not produce a response at all.
#[derive(Debug, Clone, Error)]
#[error("transport failure: {0}")]
pub struct TransportFailure(pub String);

/// One failed attempt, classified for the retry decision.
#[derive(Debug, Clone, Error)]
pub enum FetchFailure {
    /// Connection-level failure (reset, refused, timed out, ...).
    #[error("{0}")]
    Transport(#[from] TransportFailure),
    /// A response arrived with a non-success status.
    #[error("http status {status}")]
    Status {
        /// The offending status code.
        status: u16,
    },
}

impl FetchFailure {
    /// Whether the retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailure::Transport(_) => true,
            FetchFailure::Status { status } => RETRYABLE_STATUSES.contains(status),
        }
    }
}

/// Terminal fetch outcome surfaced to the caller.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The attempt budget ran out; carries the last failure.
    #[error("fetch attempts exhausted: {0}")]
    Exhausted(FetchFailure),
    /// A failure outside the retryable set.
    #[error("fetch failed: {0}")]
    NonRetryable(FetchFailure),
}

/// Issues a single request for a resource.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    /// Fetch the resource once, yielding the response (whatever its status)
    /// or a transport-level failure.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, TransportFailure>;
}

/// HTTP transport over reqwest, plain or TLS depending on the URL scheme.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport with the standard client settings.
    pub fn new() -> HttpTransport {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("lodestar/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        HttpTransport { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, TransportFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportFailure(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            body,
            headers,
        })
    }
}

/// Strip the fragment before fetching; it is client-side only.
fn sanitize_url(url: &str) -> &str {
    match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

/// Any 2xx counts as success, which deliberately includes 206 Partial
/// Content: a byte range is a complete answer for our purposes.
fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// A single logical retrieval with bounded retries.
///
/// The retry sequence is strictly sequential; waits follow the shared
/// backoff sequence starting at one second.
pub struct ResilientFetcher<T: FetchTransport = HttpTransport> {
    url: String,
    tries: u32,
    backoff: Backoff,
    transport: T,
}

impl ResilientFetcher<HttpTransport> {
    /// Fetch `url` over HTTP with the default attempt budget.
    pub fn new(url: &str) -> ResilientFetcher<HttpTransport> {
        Self::with_transport(url, DEFAULT_TRIES, HttpTransport::new())
    }
}

impl<T: FetchTransport> ResilientFetcher<T> {
    /// Fetch `url` through a custom transport with `tries` attempts.
    pub fn with_transport(url: &str, tries: u32, transport: T) -> ResilientFetcher<T> {
        ResilientFetcher {
            url: sanitize_url(url).to_string(),
            tries: tries.max(1),
            backoff: Backoff::new(),
            transport,
        }
    }

    /// Run the fetch to a terminal outcome.
    pub async fn go(mut self) -> Result<FetchResponse, FetchError> {
        loop {
            crate::metrics::fetch_attempts().inc();
            let failure = match self.transport.fetch(&self.url).await {
                Ok(response) if is_success(response.status) => return Ok(response),
                Ok(response) => FetchFailure::Status {
                    status: response.status,
                },
                Err(transport) => FetchFailure::Transport(transport),
            };

            if !failure.is_retryable() {
                return Err(FetchError::NonRetryable(failure));
            }

            self.tries -= 1;
            tracing::info!(
                url = %self.url,
                attempts_left = self.tries,
                error = %failure,
                "fetch attempt failed"
            );
            if self.tries == 0 {
                return Err(FetchError::Exhausted(failure));
            }

            crate::metrics::fetch_retries().inc();
            tokio::time::sleep(self.backoff.next()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Transport that replays a scripted sequence of outcomes.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<FetchResponse, TransportFailure>>>,
        attempts: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(
            outcomes: Vec<Result<FetchResponse, TransportFailure>>,
        ) -> (Scripted, Arc<AtomicU32>) {
            let attempts = Arc::new(AtomicU32::new(0));
            (
                Scripted {
                    outcomes: Mutex::new(outcomes.into()),
                    attempts: Arc::clone(&attempts),
                },
                attempts,
            )
        }
    }

    #[async_trait]
    impl FetchTransport for Scripted {
        async fn fetch(&self, _url: &str) -> Result<FetchResponse, TransportFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .pop_front()
                .expect("scripted transport ran out of outcomes")
        }
    }

    fn status(status: u16, body: &str) -> Result<FetchResponse, TransportFailure> {
        Ok(FetchResponse {
            status,
            body: body.as_bytes().to_vec(),
            headers: HashMap::from([("content-type".to_string(), "text/plain".to_string())]),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds_with_expected_waits() {
        let (transport, attempts) = Scripted::new(vec![
            status(503, "unavailable"),
            status(503, "unavailable"),
            status(200, "payload"),
        ]);
        let start = Instant::now();

        let response = ResilientFetcher::with_transport("http://example.test/x", 5, transport)
            .go()
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(response.body, b"payload");
        // Waits of 1.0s then 1.618s between the three attempts.
        let elapsed = start.elapsed().as_secs_f64();
        assert!((elapsed - 2.618).abs() < 0.01, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exact_attempt_budget() {
        let (transport, attempts) =
            Scripted::new(vec![status(503, "no"), status(503, "still no")]);

        let err = ResilientFetcher::with_transport("http://example.test/x", 2, transport)
            .go()
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(matches!(
            err,
            FetchError::Exhausted(FetchFailure::Status { status: 503 })
        ));
    }

    #[tokio::test]
    async fn non_retryable_status_fails_immediately() {
        let (transport, attempts) = Scripted::new(vec![status(404, "gone")]);

        let err = ResilientFetcher::with_transport("http://example.test/x", 10, transport)
            .go()
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            FetchError::NonRetryable(FetchFailure::Status { status: 404 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried() {
        let (transport, attempts) = Scripted::new(vec![
            Err(TransportFailure("connection reset".into())),
            status(200, "ok"),
        ]);

        let response = ResilientFetcher::with_transport("http://example.test/x", 3, transport)
            .go()
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn partial_content_is_success_with_unmodified_body() {
        let (transport, attempts) = Scripted::new(vec![status(206, "just a slice")]);

        let response = ResilientFetcher::with_transport("http://example.test/x", 10, transport)
            .go()
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(response.status, 206);
        assert_eq!(response.body, b"just a slice");
    }

    #[tokio::test]
    async fn success_carries_header_mapping() {
        let (transport, _) = Scripted::new(vec![status(200, "ok")]);
        let response = ResilientFetcher::with_transport("http://example.test/x", 1, transport)
            .go()
            .await
            .unwrap();
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn url_fragment_is_stripped() {
        assert_eq!(
            sanitize_url("https://example.com/page#section"),
            "https://example.com/page"
        );
        assert_eq!(sanitize_url("https://example.com/"), "https://example.com/");
    }
}
