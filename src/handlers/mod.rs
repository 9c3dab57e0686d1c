//! HTTP entry point for the upload pipeline
//!
//! A single `POST /api` route accepts `multipart/form-data`,
//! `application/x-www-form-urlencoded`, or `application/json` bodies and
//! replies per classic progressive-enhancement content negotiation: script
//! clients get a JSON acknowledgment, everything else gets a `303 See Other`
//! back to the referring page so a no-JS form submission still lands
//! somewhere sensible.

use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::header;
use http::HeaderMap;
use multer::Multipart;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::FormworkConfig;
use crate::error::UploadError;
use crate::forms::FETCH_MARKER_HEADER;
use crate::scan::MalwareScanner;
use crate::storage::{AccessPolicy, ObjectStorage};
use crate::upload::scanning::{read_scanned_body, PartFilter};
use crate::upload::streaming::read_streaming_body;
use crate::upload::{read_json_body, read_urlencoded_body};

/// Shared state for the upload handler
#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn ObjectStorage>,
    scanner: Option<Arc<dyn MalwareScanner>>,
    filter: Arc<PartFilter>,
    temp_dir: PathBuf,
    policy: AccessPolicy,
}

impl AppState {
    /// Builds handler state from configuration plus the external
    /// collaborators. A `Some` scanner selects the spool-scan-store variant
    /// for multipart bodies; `None` streams parts straight to storage.
    #[must_use]
    pub fn new(
        config: &FormworkConfig,
        storage: Arc<dyn ObjectStorage>,
        scanner: Option<Arc<dyn MalwareScanner>>,
    ) -> Self {
        Self {
            storage,
            scanner,
            filter: Arc::new(PartFilter::new(
                config.upload.allowed_extensions.clone(),
                config.upload.allowed_types.clone(),
            )),
            temp_dir: config.upload.temp_dir.clone(),
            policy: config.storage.acl,
        }
    }
}

/// Builds the application router
#[must_use]
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api", post(submit))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /api`: parse the body by content type, then negotiate the reply
async fn submit(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<Response, UploadError> {
    let headers = request.headers().clone();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = if let Ok(boundary) = multer::parse_boundary(&content_type) {
        let stream = request.into_body().into_data_stream();
        let multipart = Multipart::new(stream, boundary);
        match &state.scanner {
            Some(scanner) => {
                read_scanned_body(
                    multipart,
                    &state.temp_dir,
                    &state.filter,
                    scanner.as_ref(),
                    Arc::clone(&state.storage),
                    state.policy,
                )
                .await?
            }
            None => read_streaming_body(multipart, Arc::clone(&state.storage), state.policy).await?,
        }
    } else if content_type.contains("application/json") {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| UploadError::BodyRead(e.to_string()))?;
        read_json_body(&bytes)?
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| UploadError::BodyRead(e.to_string()))?;
        read_urlencoded_body(&bytes)?
    } else {
        return Err(UploadError::UnsupportedMediaType(content_type));
    };

    tracing::info!(
        fields = body.entries.len(),
        files = body.files().len(),
        "upload request processed"
    );

    Ok(negotiated_response(&headers))
}

/// Whether any signal in the request asks for a JSON reply: a non-navigate
/// `Sec-Fetch-Mode`, an `Accept` or request `Content-Type` mentioning JSON,
/// or the explicit fetch marker header.
fn wants_json(headers: &HeaderMap) -> bool {
    let contains = |name: header::HeaderName, needle: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(needle))
    };

    headers
        .get("sec-fetch-mode")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|mode| mode != "navigate")
        || contains(header::ACCEPT, "application/json")
        || contains(header::CONTENT_TYPE, "application/json")
        || headers.contains_key(FETCH_MARKER_HEADER)
}

fn negotiated_response(headers: &HeaderMap) -> Response {
    if wants_json(headers) {
        return Json(json!({ "ok": true })).into_response();
    }

    // Non-script fallback: bounce back to the referring page, forcing a GET
    let target = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("/");
    Redirect::to(target).into_response()
}
