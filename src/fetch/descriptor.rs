//! Request descriptors
//!
//! A [`RequestDescriptor`] is an immutable, cloneable blueprint for one HTTP
//! request. Retries re-materialize the wire request from the descriptor, so
//! every body variant keeps its data in a rebuildable form (reqwest multipart
//! forms are single-use).

use bytes::Bytes;
use http::{HeaderMap, Method};
use mime::Mime;

use super::FetchError;

/// One named part of a client-built multipart body
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Field name
    pub name: String,
    /// File name, when the part carries a file
    pub file_name: Option<String>,
    /// Declared content type
    pub content_type: Option<Mime>,
    /// Part payload
    pub data: Bytes,
}

/// Request body variants
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Raw bytes with an explicit content type
    Bytes {
        /// Declared content type
        content_type: Mime,
        /// Body payload
        data: Bytes,
    },
    /// URL-encoded key/value pairs
    Form(Vec<(String, String)>),
    /// Multipart form data, rebuilt per attempt
    Multipart(Vec<MultipartPart>),
}

/// Blueprint for one HTTP request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Target URL (query string included)
    pub url: String,
    /// Extra request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: RequestBody,
}

impl RequestDescriptor {
    /// Creates a descriptor with no headers and an empty body
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Replaces the body
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Materializes a reqwest request builder for one attempt.
    pub(crate) fn to_request(
        &self,
        client: &reqwest::Client,
    ) -> Result<reqwest::RequestBuilder, FetchError> {
        let mut request = client
            .request(self.method.clone(), self.url.as_str())
            .headers(self.headers.clone());

        request = match &self.body {
            RequestBody::Empty => request,
            RequestBody::Bytes { content_type, data } => request
                .header(http::header::CONTENT_TYPE, content_type.as_ref())
                .body(data.clone()),
            RequestBody::Form(pairs) => request.form(pairs),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut piece = reqwest::multipart::Part::bytes(part.data.to_vec());
                    if let Some(file_name) = &part.file_name {
                        piece = piece.file_name(file_name.clone());
                    }
                    if let Some(mime) = &part.content_type {
                        piece = piece
                            .mime_str(mime.as_ref())
                            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
                    }
                    form = form.part(part.name.clone(), piece);
                }
                request.multipart(form)
            }
        };

        Ok(request)
    }
}
