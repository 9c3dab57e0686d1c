//! Control validation and error-container rendering

use super::backend::{ControlRef, ControlValidity, FormBackend};

/// CSS class applied to the error container
pub const ERROR_CONTAINER_CLASS: &str = "control__errors";

/// Derived id of a control's error container
#[must_use]
pub fn error_container_id(control_id: &str) -> String {
    format!("{control_id}-input-errors")
}

/// Builds the message list for an invalid control. Flags are evaluated in a
/// fixed order (required, type, range, length, pattern) and every set flag
/// contributes a message.
fn error_messages<B: FormBackend>(
    backend: &B,
    control: ControlRef,
    validity: &ControlValidity,
) -> Vec<String> {
    let attr = |name: &str| backend.attr(control, name).unwrap_or_default();

    let mut errors = Vec::new();
    if validity.value_missing {
        errors.push("Field is required.".to_string());
    }
    if validity.type_mismatch {
        errors.push(format!("Must be of type {}.", attr("type")));
    }
    if validity.range_underflow {
        errors.push(format!("Must be greater than {}.", attr("min")));
    }
    if validity.range_overflow {
        errors.push(format!("Must be less than {}.", attr("max")));
    }
    if validity.too_short {
        errors.push(format!("Must be longer than {}.", attr("minlength")));
    }
    if validity.too_long {
        errors.push(format!("Must be shorter than {}.", attr("maxlength")));
    }
    if validity.pattern_mismatch {
        errors.push(format!("Does not match pattern ({}).", attr("pattern")));
    }
    errors
}

/// Re-validates one control and syncs its error UI.
///
/// Always removes and recreates the error container (avoiding duplicate
/// screen-reader announcements), toggles `aria-invalid`, and maintains the
/// `aria-describedby` list (pre-existing descriptors are preserved, with the
/// error container id filtered out before being re-added).
///
/// Returns whether the control is valid.
pub fn validate_control<B: FormBackend>(backend: &mut B, control: ControlRef) -> bool {
    let control_id = backend.ensure_id(control);
    let errors_id = error_container_id(&control_id);

    let mut descriptors: Vec<String> = backend
        .attr(control, "aria-describedby")
        .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();
    descriptors.retain(|descriptor| descriptor != &errors_id);

    let validity = backend.validity(control);
    backend.set_attr(control, "aria-invalid", "false");
    backend.remove_element(&errors_id);

    if !validity.valid() {
        backend.set_attr(control, "aria-invalid", "true");
        let text = error_messages(backend, control, &validity).join(" ");
        backend.insert_error_container(control, &errors_id, ERROR_CONTAINER_CLASS, &text);
        descriptors.push(errors_id);
    }

    if !descriptors.is_empty() {
        backend.set_attr(control, "aria-describedby", &descriptors.join(" "));
    }

    validity.valid()
}
