//! Form enhancement: validation wiring and intercepted submission
//!
//! [`FormEnhancer`] owns the per-session enhancement state: which controls
//! have been touched (first blur flips a control from untouched to touched;
//! after that every input/blur event revalidates), which forms are guarded
//! against navigation with unsaved changes, and the at-most-one in-flight
//! submission per form.
//!
//! The embedding host remains responsible for suppressing the browser's
//! native submit navigation; this layer decides whether submission proceeds
//! and performs it through the resilient fetch wrapper.

use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::backend::{ControlRef, FieldValue, FormBackend, FormRef};
use super::validate::validate_control;
use crate::fetch::{
    FetchClient, FetchOptions, MultipartPart, RequestBody, RequestDescriptor, RequestHandle,
};

/// Marker header identifying enhanced-fetch submissions to the server's
/// content negotiation
pub const FETCH_MARKER_HEADER: &str = "x-custom-fetch";

/// DOM events the enhancement layer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Value changed
    Input,
    /// Focus left the control
    Blur,
}

/// Per-form enhancement options
#[derive(Debug, Clone, Copy, Default)]
pub struct EnhanceOptions {
    /// Block page unload while the form has unsaved changes
    pub prevent_nav: bool,
}

/// Attaches validation and intercepted submission to native forms
pub struct FormEnhancer<B: FormBackend> {
    backend: B,
    fetch: FetchClient,
    touched: HashSet<ControlRef>,
    guarded: HashSet<FormRef>,
    dirty: HashSet<FormRef>,
    pending: Arc<Mutex<HashMap<FormRef, RequestHandle>>>,
}

impl<B: FormBackend> FormEnhancer<B> {
    /// Creates an enhancer over a backend
    pub fn new(backend: B, fetch: FetchClient) -> Self {
        Self {
            backend,
            fetch,
            touched: HashSet::new(),
            guarded: HashSet::new(),
            dirty: HashSet::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared access to the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Registers a form for enhancement
    pub fn enhance_form(&mut self, form: FormRef, options: EnhanceOptions) {
        if options.prevent_nav {
            self.guarded.insert(form);
        }
    }

    /// Handles an input/blur event on a control.
    ///
    /// The first blur marks the control touched; from then on every event
    /// revalidates it. Events on untouched controls do nothing, so users are
    /// not shouted at while still typing their first attempt.
    pub fn handle_control_event(&mut self, control: ControlRef, event: ControlEvent) {
        if event == ControlEvent::Blur {
            self.touched.insert(control);
        }
        if self.touched.contains(&control) {
            validate_control(&mut self.backend, control);
        }
    }

    /// Handles a change event on a guarded form
    pub fn handle_change(&mut self, form: FormRef) {
        if self.guarded.contains(&form) {
            self.dirty.insert(form);
        }
    }

    /// Whether page unload should be blocked (some guarded form is dirty)
    #[must_use]
    pub fn should_block_unload(&self) -> bool {
        self.dirty.iter().any(|form| self.guarded.contains(form))
    }

    /// The form's in-flight submission, if any
    #[must_use]
    pub fn pending_request(&self, form: FormRef) -> Option<RequestHandle> {
        self.pending.lock().get(&form).cloned()
    }

    /// Intercepted submit.
    ///
    /// Force-validates every control; when any is invalid, focuses the first
    /// invalid control and returns `None` without touching the network. An
    /// in-flight submission for this form is aborted before the new one
    /// starts, and the new handle is tracked until it settles.
    ///
    /// Must be called within a tokio runtime; the settle watcher that clears
    /// the pending slot is a spawned task.
    pub fn submit(&mut self, form: FormRef, options: FetchOptions) -> Option<RequestHandle> {
        self.dirty.remove(&form);

        let controls = self.backend.controls(form);
        let mut first_invalid = None;
        for &control in &controls {
            self.touched.insert(control);
            if !validate_control(&mut self.backend, control) && first_invalid.is_none() {
                first_invalid = Some(control);
            }
        }
        if let Some(control) = first_invalid {
            self.backend.focus(control);
            return None;
        }

        if let Some(previous) = self.pending.lock().remove(&form) {
            previous.abort();
        }

        let descriptor = self.build_descriptor(form);
        let handle = self.fetch.request(descriptor, options);

        self.pending.lock().insert(form, handle.clone());
        let pending = Arc::clone(&self.pending);
        let watcher = handle.clone();
        tokio::spawn(async move {
            // Starts (or joins) the execution and clears the slot on settle,
            // unless a newer submission already replaced it
            let _ = watcher.send().await;
            let mut map = pending.lock();
            if map
                .get(&form)
                .is_some_and(|current| current.same_execution(&watcher))
            {
                map.remove(&form);
            }
        });

        Some(handle)
    }

    fn build_descriptor(&self, form: FormRef) -> RequestDescriptor {
        let action = self.backend.form_action(form).unwrap_or_else(|| "/".to_string());
        let data = self.backend.form_data(form);

        let is_post = self
            .backend
            .form_method(form)
            .is_some_and(|method| method.eq_ignore_ascii_case("post"));

        let mut descriptor = if is_post {
            let is_multipart = self
                .backend
                .form_enctype(form)
                .is_some_and(|enctype| enctype.eq_ignore_ascii_case("multipart/form-data"));
            let body = if is_multipart {
                RequestBody::Multipart(multipart_parts(data))
            } else {
                RequestBody::Form(text_pairs(data))
            };
            RequestDescriptor::new(Method::POST, action).with_body(body)
        } else {
            RequestDescriptor::new(Method::GET, url_with_query(&action, text_pairs(data)))
        };

        descriptor.headers.insert(
            FETCH_MARKER_HEADER,
            http::HeaderValue::from_static("true"),
        );
        descriptor
    }
}

/// Text fields only; file controls cannot be carried in urlencoded data
fn text_pairs(data: Vec<(String, FieldValue)>) -> Vec<(String, String)> {
    data.into_iter()
        .filter_map(|(name, value)| match value {
            FieldValue::Text(text) => Some((name, text)),
            FieldValue::File { .. } => None,
        })
        .collect()
}

fn multipart_parts(data: Vec<(String, FieldValue)>) -> Vec<MultipartPart> {
    data.into_iter()
        .map(|(name, value)| match value {
            FieldValue::Text(text) => MultipartPart {
                name,
                file_name: None,
                content_type: None,
                data: Bytes::from(text),
            },
            FieldValue::File {
                file_name,
                content_type,
                data,
            } => MultipartPart {
                name,
                file_name: Some(file_name),
                content_type,
                data,
            },
        })
        .collect()
}

/// Replaces the action's query string with the serialized fields
fn url_with_query(action: &str, pairs: Vec<(String, String)>) -> String {
    let mut url = action
        .split('?')
        .next()
        .unwrap_or(action)
        .to_string();
    let query = serde_urlencoded::to_string(&pairs).unwrap_or_default();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::backend::ControlValidity;
    use crate::testing::FakeBackend;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use std::collections::HashMap as StdHashMap;
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn spawn_server(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn enhancer_with_form(
        action: Option<&str>,
        method: &str,
        enctype: Option<&str>,
    ) -> (FormEnhancer<FakeBackend>, FormRef) {
        let mut backend = FakeBackend::new();
        let form = backend.add_form(method, action, enctype);
        (FormEnhancer::new(backend, FetchClient::new()), form)
    }

    #[tokio::test]
    async fn untouched_controls_are_left_alone() {
        let (mut enhancer, form) = enhancer_with_form(None, "post", None);
        let control = enhancer.backend_mut().add_control(
            form,
            "email",
            ControlValidity {
                value_missing: true,
                ..ControlValidity::default()
            },
        );

        enhancer.handle_control_event(control, ControlEvent::Input);
        assert!(enhancer.backend().attr(control, "aria-invalid").is_none());

        enhancer.handle_control_event(control, ControlEvent::Blur);
        assert_eq!(
            enhancer.backend().attr(control, "aria-invalid").as_deref(),
            Some("true")
        );

        // Once touched, input events revalidate too
        enhancer
            .backend_mut()
            .set_validity(control, ControlValidity::default());
        enhancer.handle_control_event(control, ControlEvent::Input);
        assert_eq!(
            enhancer.backend().attr(control, "aria-invalid").as_deref(),
            Some("false")
        );
    }

    #[tokio::test]
    async fn invalid_form_blocks_submission_and_focuses_first() {
        let (mut enhancer, form) = enhancer_with_form(None, "post", None);
        let first = enhancer.backend_mut().add_control(
            form,
            "name",
            ControlValidity {
                value_missing: true,
                ..ControlValidity::default()
            },
        );
        let second = enhancer.backend_mut().add_control(
            form,
            "email",
            ControlValidity {
                type_mismatch: true,
                ..ControlValidity::default()
            },
        );

        assert!(enhancer.submit(form, FetchOptions::default()).is_none());

        assert_eq!(enhancer.backend().focused(), Some(first));
        // Force-validation touched every control, not just the first
        assert_eq!(
            enhancer.backend().attr(second, "aria-invalid").as_deref(),
            Some("true")
        );
        assert!(enhancer.pending_request(form).is_none());
    }

    #[tokio::test]
    async fn post_submits_urlencoded_body() {
        let (body_tx, body_rx) = tokio::sync::oneshot::channel::<String>();
        let body_tx = Arc::new(Mutex::new(Some(body_tx)));
        let app = Router::new().route(
            "/api",
            post(move |body: String| {
                let body_tx = Arc::clone(&body_tx);
                async move {
                    if let Some(tx) = body_tx.lock().take() {
                        let _ = tx.send(body);
                    }
                    StatusCode::OK
                }
            }),
        );
        let addr = spawn_server(app).await;

        let (mut enhancer, form) =
            enhancer_with_form(Some(&format!("http://{addr}/api")), "post", None);
        let control = enhancer
            .backend_mut()
            .add_control(form, "name", ControlValidity::default());
        enhancer.backend_mut().set_value(control, "amphibia");

        let handle = enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(handle.send().await.unwrap().unwrap().ok());
        assert_eq!(body_rx.await.unwrap(), "name=amphibia");
    }

    #[tokio::test]
    async fn get_serializes_fields_into_query() {
        let (query_tx, query_rx) = tokio::sync::oneshot::channel::<StdHashMap<String, String>>();
        let query_tx = Arc::new(Mutex::new(Some(query_tx)));
        let app = Router::new().route(
            "/search",
            get(move |Query(params): Query<StdHashMap<String, String>>| {
                let query_tx = Arc::clone(&query_tx);
                async move {
                    if let Some(tx) = query_tx.lock().take() {
                        let _ = tx.send(params);
                    }
                    StatusCode::OK
                }
            }),
        );
        let addr = spawn_server(app).await;

        let (mut enhancer, form) = enhancer_with_form(
            Some(&format!("http://{addr}/search?stale=1")),
            "get",
            None,
        );
        let control = enhancer
            .backend_mut()
            .add_control(form, "q", ControlValidity::default());
        enhancer.backend_mut().set_value(control, "tree frogs");

        let handle = enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(handle.send().await.unwrap().unwrap().ok());

        let params = query_rx.await.unwrap();
        assert_eq!(params.get("q").map(String::as_str), Some("tree frogs"));
        // The action's own query string is replaced, not appended to
        assert!(!params.contains_key("stale"));
    }

    #[tokio::test]
    async fn multipart_enctype_sends_multipart_body() {
        let (ct_tx, ct_rx) = tokio::sync::oneshot::channel::<String>();
        let ct_tx = Arc::new(Mutex::new(Some(ct_tx)));
        let app = Router::new().route(
            "/api",
            post(move |headers: axum::http::HeaderMap| {
                let ct_tx = Arc::clone(&ct_tx);
                async move {
                    let content_type = headers
                        .get(http::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if let Some(tx) = ct_tx.lock().take() {
                        let _ = tx.send(content_type);
                    }
                    StatusCode::OK
                }
            }),
        );
        let addr = spawn_server(app).await;

        let (mut enhancer, form) = enhancer_with_form(
            Some(&format!("http://{addr}/api")),
            "post",
            Some("multipart/form-data"),
        );
        let text = enhancer
            .backend_mut()
            .add_control(form, "caption", ControlValidity::default());
        enhancer.backend_mut().set_value(text, "my upload");
        let file = enhancer
            .backend_mut()
            .add_control(form, "photo", ControlValidity::default());
        enhancer.backend_mut().set_file(
            file,
            "shot.jpg",
            Some(mime::IMAGE_JPEG),
            Bytes::from_static(b"jpegjpeg"),
        );

        let handle = enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(handle.send().await.unwrap().unwrap().ok());
        assert!(ct_rx.await.unwrap().starts_with("multipart/form-data"));
    }

    #[tokio::test]
    async fn new_submission_aborts_the_pending_one() {
        let app = Router::new().route(
            "/api",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );
        let addr = spawn_server(app).await;

        let (mut enhancer, form) =
            enhancer_with_form(Some(&format!("http://{addr}/api")), "post", None);
        enhancer
            .backend_mut()
            .add_control(form, "name", ControlValidity::default());

        let first = enhancer.submit(form, FetchOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(enhancer.pending_request(form).is_some());

        let second = enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(first.is_aborted());
        assert!(!second.is_aborted());
        assert!(enhancer
            .pending_request(form)
            .is_some_and(|handle| handle.same_execution(&second)));
    }

    #[tokio::test]
    async fn pending_slot_clears_on_settle() {
        let app = Router::new().route("/api", post(|| async { StatusCode::OK }));
        let addr = spawn_server(app).await;

        let (mut enhancer, form) =
            enhancer_with_form(Some(&format!("http://{addr}/api")), "post", None);
        enhancer
            .backend_mut()
            .add_control(form, "name", ControlValidity::default());

        let handle = enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(handle.send().await.unwrap().unwrap().ok());

        // Give the watcher task a beat to clear the slot
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(enhancer.pending_request(form).is_none());
    }

    #[tokio::test]
    async fn unsaved_changes_guard() {
        let app = Router::new().route("/api", post(|| async { StatusCode::OK }));
        let addr = spawn_server(app).await;

        let (mut enhancer, form) =
            enhancer_with_form(Some(&format!("http://{addr}/api")), "post", None);
        enhancer
            .backend_mut()
            .add_control(form, "name", ControlValidity::default());
        enhancer.enhance_form(form, EnhanceOptions { prevent_nav: true });

        assert!(!enhancer.should_block_unload());
        enhancer.handle_change(form);
        assert!(enhancer.should_block_unload());

        enhancer.submit(form, FetchOptions::default()).unwrap();
        assert!(!enhancer.should_block_unload());
    }

    #[tokio::test]
    async fn unguarded_forms_never_block_unload() {
        let (mut enhancer, form) = enhancer_with_form(None, "post", None);
        enhancer.handle_change(form);
        assert!(!enhancer.should_block_unload());
    }

    #[test]
    fn query_building_replaces_existing_search() {
        let url = url_with_query(
            "/search?old=1",
            vec![("q".to_string(), "a b".to_string())],
        );
        assert_eq!(url, "/search?q=a+b");

        let bare = url_with_query("/search", vec![]);
        assert_eq!(bare, "/search");
    }
}
