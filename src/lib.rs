//! formwork: progressive enhancement for forms and uploads
//!
//! Two loosely coupled halves share this crate:
//!
//! - **Client side**: [`fetch`] wraps a request with timeout, retry with
//!   backoff, abortability, and lazy memoized execution; [`forms`] builds on
//!   it to upgrade native HTML forms with validation UI and intercepted
//!   submission, behind a DOM-agnostic backend trait.
//! - **Server side**: [`upload`] parses incoming bodies into a normalized
//!   fields/files result, streaming file parts into [`storage`] or spooling
//!   them through a [`scan`] pass first; [`handlers`] exposes the `POST /api`
//!   endpoint with JSON-or-redirect content negotiation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use formwork::config::FormworkConfig;
//! use formwork::handlers::{router, AppState};
//! use formwork::storage::S3ObjectStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FormworkConfig::load()?;
//!     let storage = Arc::new(S3ObjectStorage::from_settings(&config.storage).await);
//!
//!     let state = AppState::new(&config, storage, None);
//!     let app = router(state, config.server.max_body_bytes);
//!
//!     let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod forms;
pub mod handlers;
pub mod scan;
pub mod storage;
pub mod upload;

#[cfg(test)]
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits

    // Resilient fetch
    pub use crate::fetch::{
        FetchClient, FetchError, FetchOptions, FetchResponse, Payload, RequestBody,
        RequestDescriptor, RequestHandle,
    };

    // Form enhancement
    pub use crate::forms::{
        ControlEvent, ControlRef, ControlValidity, EnhanceOptions, FieldValue, FormBackend,
        FormEnhancer, FormRef,
    };

    // Upload pipeline
    pub use crate::upload::scanning::PartFilter;
    pub use crate::upload::{BodyValue, UploadBody, UploadedPart};

    // External collaborators
    pub use crate::scan::{ClamAvScanner, MalwareScanner, NoOpScanner};
    pub use crate::storage::{AccessPolicy, ObjectStorage, S3ObjectStorage, StoredObject};

    // HTTP surface
    pub use crate::handlers::{router, AppState};

    // Errors and configuration
    pub use crate::config::FormworkConfig;
    pub use crate::error::UploadError;
}
