//! Form backend capability trait
//!
//! The enhancement logic never touches a real DOM. Everything it needs from
//! the document (enumerating controls, reading validity state, toggling
//! attributes, inserting the error container) goes through [`FormBackend`],
//! so the validation and submission flow is testable with an in-memory
//! implementation and portable across embedding hosts (a WebView bridge, a
//! server-rendered test harness, ...).

use bytes::Bytes;
use mime::Mime;

/// Opaque reference to a form element, issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormRef(pub usize);

/// Opaque reference to a form control, issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRef(pub usize);

/// Native validity flags for one control
///
/// Mirrors the platform `ValidityState` object: several flags can be set at
/// once, and the control is valid only when none are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlValidity {
    /// Required control has no value
    pub value_missing: bool,
    /// Value does not conform to the control's type (email, url, ...)
    pub type_mismatch: bool,
    /// Value is below the control's minimum
    pub range_underflow: bool,
    /// Value is above the control's maximum
    pub range_overflow: bool,
    /// Value is shorter than the control's minimum length
    pub too_short: bool,
    /// Value is longer than the control's maximum length
    pub too_long: bool,
    /// Value does not match the control's pattern
    pub pattern_mismatch: bool,
}

impl ControlValidity {
    /// Whether no constraint is violated
    #[must_use]
    pub fn valid(&self) -> bool {
        !(self.value_missing
            || self.type_mismatch
            || self.range_underflow
            || self.range_overflow
            || self.too_short
            || self.too_long
            || self.pattern_mismatch)
    }
}

/// A value read out of a form control at submit time
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Text-valued control
    Text(String),
    /// File-valued control
    File {
        /// Selected file's name
        file_name: String,
        /// Selected file's content type
        content_type: Option<Mime>,
        /// File contents
        data: Bytes,
    },
}

/// Capability interface the enhancement layer depends on
pub trait FormBackend {
    /// Controls belonging to a form, in document order
    fn controls(&self, form: FormRef) -> Vec<ControlRef>;

    /// The control's element id, assigning a generated one when absent
    fn ensure_id(&mut self, control: ControlRef) -> String;

    /// The control's current native validity state
    fn validity(&self, control: ControlRef) -> ControlValidity;

    /// Reads an attribute off the control
    fn attr(&self, control: ControlRef, name: &str) -> Option<String>;

    /// Writes an attribute on the control
    fn set_attr(&mut self, control: ControlRef, name: &str, value: &str);

    /// Removes the element with the given id, if present
    fn remove_element(&mut self, id: &str);

    /// Inserts an error container element before the control's parent
    fn insert_error_container(&mut self, control: ControlRef, id: &str, class: &str, text: &str);

    /// Moves focus to the control
    fn focus(&mut self, control: ControlRef);

    /// The form's method attribute (defaults to GET semantics upstream)
    fn form_method(&self, form: FormRef) -> Option<String>;

    /// The form's action URL
    fn form_action(&self, form: FormRef) -> Option<String>;

    /// The form's enctype attribute
    fn form_enctype(&self, form: FormRef) -> Option<String>;

    /// Current values of the form's named controls, in document order
    fn form_data(&self, form: FormRef) -> Vec<(String, FieldValue)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_default_is_valid() {
        assert!(ControlValidity::default().valid());
    }

    #[test]
    fn any_flag_invalidates() {
        let validity = ControlValidity {
            pattern_mismatch: true,
            ..ControlValidity::default()
        };
        assert!(!validity.valid());
    }
}
