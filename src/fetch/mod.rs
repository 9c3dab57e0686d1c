//! Resilient fetch wrapper
//!
//! Wraps an HTTP request with timeout, retry-with-backoff, abortability, and
//! lazy execution. Construction performs no I/O: the returned
//! [`RequestHandle`] starts the request on first [`send`](RequestHandle::send)
//! and memoizes the outcome, so awaiting it twice issues exactly one network
//! call.
//!
//! Cancellation is deliberately not surfaced as a failure: an aborted handle
//! settles as `Ok(None)`, and callers that need to distinguish a user abort
//! from other outcomes check [`RequestHandle::is_aborted`]. This mirrors the
//! progressive-enhancement use case, where a submission aborted by a newer
//! submission should simply go quiet.
//!
//! # Examples
//!
//! ```rust,no_run
//! use formwork::fetch::{FetchClient, FetchOptions, RequestDescriptor};
//! use http::Method;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), formwork::fetch::FetchError> {
//! let client = FetchClient::new();
//! let handle = client.request(
//!     RequestDescriptor::new(Method::GET, "https://example.com/api"),
//!     FetchOptions {
//!         timeout: Some(Duration::from_secs(5)),
//!         retry: 3,
//!         ..FetchOptions::default()
//!     },
//! );
//!
//! // No network call has happened yet; the first send starts it.
//! if let Some(response) = handle.send().await? {
//!     println!("{:?}", response.payload);
//! }
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod handle;

pub use descriptor::{MultipartPart, RequestBody, RequestDescriptor};
pub use handle::RequestHandle;

use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default base delay between retry attempts
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(500);

/// Hook applied to the descriptor before each attempt is sent
pub type ModifyRequest = Arc<dyn Fn(RequestDescriptor) -> RequestDescriptor + Send + Sync>;

/// Hook applied to a successful response before the handle settles
pub type ModifyResponse = Arc<dyn Fn(FetchResponse) -> FetchResponse + Send + Sync>;

/// Per-request configuration
#[derive(Clone)]
pub struct FetchOptions {
    /// Deadline for the whole execution, retries and backoff included
    pub timeout: Option<Duration>,

    /// Number of retry attempts after the first (total attempts = retry + 1)
    pub retry: u32,

    /// Base delay before the first retry
    pub retry_wait: Duration,

    /// Double the delay after each retry
    pub retry_exponential: bool,

    /// External cancellation token; the handle creates and owns one when
    /// this is `None`
    pub signal: Option<CancellationToken>,

    /// Pre-send descriptor transform
    pub modify_request: Option<ModifyRequest>,

    /// Post-receive response transform
    pub modify_response: Option<ModifyResponse>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retry: 0,
            retry_wait: DEFAULT_RETRY_WAIT,
            retry_exponential: true,
            signal: None,
            modify_request: None,
            modify_response: None,
        }
    }
}

impl std::fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("retry_wait", &self.retry_wait)
            .field("retry_exponential", &self.retry_exponential)
            .field("modify_request", &self.modify_request.is_some())
            .field("modify_response", &self.modify_response.is_some())
            .finish_non_exhaustive()
    }
}

/// Parsed response payload, chosen by the declared content type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON
    Json(serde_json::Value),
    /// Body read as plain text
    Text(String),
}

impl Payload {
    /// The payload as JSON, if it was parsed as such
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The payload as text, if it was read as such
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// A completed response with its parsed payload attached
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Response status
    pub status: StatusCode,
    /// Canonical status text
    pub status_text: String,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: String,
    /// Parsed payload
    pub payload: Payload,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

/// Fetch wrapper errors
///
/// Cancellation is absent on purpose: an aborted request settles as
/// `Ok(None)`, never as an error.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The whole-execution deadline elapsed
    #[error("HTTP request exceeded timeout limit")]
    Timeout,

    /// Terminal non-success status after retries were exhausted
    #[error("{status} {status_text}")]
    Http {
        /// Final response status
        status: StatusCode,
        /// Canonical status text
        status_text: String,
        /// The final response, parsed for inspection
        response: FetchResponse,
    },

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The descriptor could not be materialized into a request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Wait applied before retry attempt `k` (1-based).
///
/// `base * 2^(k-1)` when exponential backoff is enabled, constant `base`
/// otherwise. Saturates rather than overflowing for absurd attempt counts.
#[must_use]
pub fn backoff_wait(base: Duration, exponential: bool, attempt: u32) -> Duration {
    if exponential && attempt > 1 {
        let factor = 2u32.saturating_pow(attempt - 1);
        base.saturating_mul(factor)
    } else {
        base
    }
}

/// Entry point for building resilient requests
#[derive(Debug, Clone, Default)]
pub struct FetchClient {
    http: reqwest::Client,
}

impl FetchClient {
    /// Creates a client with default reqwest settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing reqwest client
    #[must_use]
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Builds a lazy request handle. No I/O happens until the handle is
    /// first sent.
    #[must_use]
    pub fn request(&self, descriptor: RequestDescriptor, options: FetchOptions) -> RequestHandle {
        RequestHandle::new(self.http.clone(), descriptor, options)
    }
}
