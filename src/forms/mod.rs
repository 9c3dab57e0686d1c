//! Progressive enhancement for native HTML forms
//!
//! Upgrades a native form without changing its server contract: validation
//! messages rendered from the platform validity flags (communicated through
//! `aria-invalid` / `aria-describedby` and a derived
//! `<control-id>-input-errors` container), submission intercepted and sent
//! through the resilient [`fetch`](crate::fetch) wrapper with at most one
//! in-flight request per form, and an optional unsaved-changes navigation
//! guard.
//!
//! The DOM is abstracted behind [`FormBackend`], so all of the above is
//! plain testable logic; only a thin host adapter needs to know about real
//! elements and events.

mod backend;
mod enhance;
mod validate;

pub use backend::{ControlRef, ControlValidity, FieldValue, FormBackend, FormRef};
pub use enhance::{ControlEvent, EnhanceOptions, FormEnhancer, FETCH_MARKER_HEADER};
pub use validate::{error_container_id, validate_control, ERROR_CONTAINER_CLASS};
