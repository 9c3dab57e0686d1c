//! Lazy, memoized, abortable request handles

use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{backoff_wait, FetchError, FetchOptions, FetchResponse, Payload, RequestDescriptor};

/// The settled outcome shared by every awaiter. `Ok(None)` means the request
/// was aborted.
type Settled = Result<Option<FetchResponse>, FetchError>;

/// Handle to a lazily executed request
///
/// The handle is an explicit state holder over the request's lifecycle:
/// not-started until the first [`send`](Self::send), in-flight while the
/// attempt loop runs, then settled with a memoized outcome that every
/// subsequent or concurrent `send` observes. Cloning the handle shares the
/// same underlying execution.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    http: reqwest::Client,
    descriptor: RequestDescriptor,
    options: FetchOptions,
    cancel: CancellationToken,
    cell: OnceCell<Settled>,
}

impl RequestHandle {
    pub(crate) fn new(
        http: reqwest::Client,
        descriptor: RequestDescriptor,
        options: FetchOptions,
    ) -> Self {
        let cancel = options.signal.clone().unwrap_or_default();
        Self {
            inner: Arc::new(HandleInner {
                http,
                descriptor,
                options,
                cancel,
                cell: OnceCell::new(),
            }),
        }
    }

    /// Starts the request, or joins the execution already in flight, and
    /// waits for the shared outcome.
    ///
    /// `Ok(None)` means the handle was aborted; cancellation never surfaces
    /// as an error. Use [`is_aborted`](Self::is_aborted) to distinguish it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] when the whole-execution deadline
    /// elapses, [`FetchError::Http`] when retries are exhausted on a
    /// non-success status, or [`FetchError::Network`] on connection failure.
    pub async fn send(&self) -> Settled {
        let inner = Arc::clone(&self.inner);
        self.inner
            .cell
            .get_or_init(move || execute(inner))
            .await
            .clone()
    }

    /// Cancels the underlying network operation.
    ///
    /// Aborting before the first `send` prevents the network call from ever
    /// being issued. Already-resolved executions are not undone.
    pub fn abort(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether the handle's cancellation token has fired
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Whether the execution has settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.cell.initialized()
    }

    /// Whether two handles share the same underlying execution
    #[must_use]
    pub fn same_execution(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("url", &self.inner.descriptor.url)
            .field("settled", &self.is_settled())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Runs the whole execution: cancellation and deadline race the attempt loop.
async fn execute(inner: Arc<HandleInner>) -> Settled {
    if inner.cancel.is_cancelled() {
        return Ok(None);
    }

    match inner.options.timeout {
        Some(limit) => tokio::select! {
            biased;
            () = inner.cancel.cancelled() => Ok(None),
            () = tokio::time::sleep(limit) => Err(FetchError::Timeout),
            result = attempt_loop(&inner) => result.map(Some),
        },
        None => tokio::select! {
            biased;
            () = inner.cancel.cancelled() => Ok(None),
            result = attempt_loop(&inner) => result.map(Some),
        },
    }
}

/// Sequential attempts with backoff between them. Only non-success statuses
/// are retried; connection-level failures surface immediately.
async fn attempt_loop(inner: &HandleInner) -> Result<FetchResponse, FetchError> {
    let mut descriptor = inner.descriptor.clone();
    let mut attempt = 0u32;

    loop {
        if let Some(hook) = &inner.options.modify_request {
            descriptor = hook(descriptor);
        }

        let response = descriptor
            .to_request(&inner.http)?
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if response.status().is_success() {
            let mut parsed = parse_response(response).await?;
            if let Some(hook) = &inner.options.modify_response {
                parsed = hook(parsed);
            }
            return Ok(parsed);
        }

        if attempt >= inner.options.retry {
            let parsed = parse_response(response).await?;
            return Err(FetchError::Http {
                status: parsed.status,
                status_text: parsed.status_text.clone(),
                response: parsed,
            });
        }

        attempt += 1;
        let wait = backoff_wait(
            inner.options.retry_wait,
            inner.options.retry_exponential,
            attempt,
        );
        tracing::debug!(
            url = %descriptor.url,
            attempt,
            wait_ms = wait.as_millis() as u64,
            "retrying after non-success status"
        );
        tokio::time::sleep(wait).await;
    }
}

/// Reads the body as JSON or text depending on the declared content type and
/// attaches it to the response metadata.
async fn parse_response(response: reqwest::Response) -> Result<FetchResponse, FetchError> {
    let status = response.status();
    let status_text = status.canonical_reason().unwrap_or("").to_string();
    let headers = response.headers().clone();
    let url = response.url().to_string();

    let is_json = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));

    let payload = if is_json {
        Payload::Json(
            response
                .json()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?,
        )
    } else {
        Payload::Text(
            response
                .text()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?,
        )
    };

    Ok(FetchResponse {
        status,
        status_text,
        headers,
        url,
        payload,
    })
}
