//! Test support: in-memory fakes for the form backend and object storage

use bytes::Bytes;
use mime::Mime;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::forms::{ControlRef, ControlValidity, FieldValue, FormBackend, FormRef};
use crate::storage::{
    AccessPolicy, ByteStreamBody, ObjectStorage, StorageResult, StoredObject,
};

/// An element inserted by the validation UI
#[derive(Debug, Clone)]
pub struct FakeElement {
    /// CSS class
    pub class: String,
    /// Text content
    pub text: String,
}

#[derive(Debug, Default)]
struct FakeControl {
    name: String,
    value: String,
    file: Option<(String, Option<Mime>, Bytes)>,
    validity: ControlValidity,
    attrs: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct FakeForm {
    method: String,
    action: Option<String>,
    enctype: Option<String>,
    controls: Vec<ControlRef>,
}

/// In-memory form backend: a fake DOM for exercising the enhancement layer
#[derive(Debug, Default)]
pub struct FakeBackend {
    forms: Vec<FakeForm>,
    controls: Vec<FakeControl>,
    elements: HashMap<String, FakeElement>,
    focused: Option<ControlRef>,
}

impl FakeBackend {
    /// Creates an empty fake document
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a form
    pub fn add_form(
        &mut self,
        method: &str,
        action: Option<&str>,
        enctype: Option<&str>,
    ) -> FormRef {
        self.forms.push(FakeForm {
            method: method.to_string(),
            action: action.map(str::to_owned),
            enctype: enctype.map(str::to_owned),
            controls: Vec::new(),
        });
        FormRef(self.forms.len() - 1)
    }

    /// Adds a named control to a form
    pub fn add_control(
        &mut self,
        form: FormRef,
        name: &str,
        validity: ControlValidity,
    ) -> ControlRef {
        self.controls.push(FakeControl {
            name: name.to_string(),
            validity,
            ..FakeControl::default()
        });
        let control = ControlRef(self.controls.len() - 1);
        self.forms[form.0].controls.push(control);
        control
    }

    /// Replaces a control's validity state
    pub fn set_validity(&mut self, control: ControlRef, validity: ControlValidity) {
        self.controls[control.0].validity = validity;
    }

    /// Sets a control's text value
    pub fn set_value(&mut self, control: ControlRef, value: &str) {
        self.controls[control.0].value = value.to_string();
    }

    /// Turns a control into a file control with the given selection
    pub fn set_file(
        &mut self,
        control: ControlRef,
        file_name: &str,
        content_type: Option<Mime>,
        data: Bytes,
    ) {
        self.controls[control.0].file = Some((file_name.to_string(), content_type, data));
    }

    /// Looks up an inserted element by id
    pub fn element(&self, id: &str) -> Option<&FakeElement> {
        self.elements.get(id)
    }

    /// The currently focused control
    pub fn focused(&self) -> Option<ControlRef> {
        self.focused
    }
}

impl FormBackend for FakeBackend {
    fn controls(&self, form: FormRef) -> Vec<ControlRef> {
        self.forms[form.0].controls.clone()
    }

    fn ensure_id(&mut self, control: ControlRef) -> String {
        if let Some(id) = self.controls[control.0].attrs.get("id") {
            return id.clone();
        }
        let id = format!("control-{}", control.0);
        self.controls[control.0]
            .attrs
            .insert("id".to_string(), id.clone());
        id
    }

    fn validity(&self, control: ControlRef) -> ControlValidity {
        self.controls[control.0].validity
    }

    fn attr(&self, control: ControlRef, name: &str) -> Option<String> {
        self.controls[control.0].attrs.get(name).cloned()
    }

    fn set_attr(&mut self, control: ControlRef, name: &str, value: &str) {
        self.controls[control.0]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    fn remove_element(&mut self, id: &str) {
        self.elements.remove(id);
    }

    fn insert_error_container(
        &mut self,
        _control: ControlRef,
        id: &str,
        class: &str,
        text: &str,
    ) {
        self.elements.insert(
            id.to_string(),
            FakeElement {
                class: class.to_string(),
                text: text.to_string(),
            },
        );
    }

    fn focus(&mut self, control: ControlRef) {
        self.focused = Some(control);
    }

    fn form_method(&self, form: FormRef) -> Option<String> {
        Some(self.forms[form.0].method.clone())
    }

    fn form_action(&self, form: FormRef) -> Option<String> {
        self.forms[form.0].action.clone()
    }

    fn form_enctype(&self, form: FormRef) -> Option<String> {
        self.forms[form.0].enctype.clone()
    }

    fn form_data(&self, form: FormRef) -> Vec<(String, FieldValue)> {
        self.forms[form.0]
            .controls
            .iter()
            .map(|control| {
                let state = &self.controls[control.0];
                let value = match &state.file {
                    Some((file_name, content_type, data)) => FieldValue::File {
                        file_name: file_name.clone(),
                        content_type: content_type.clone(),
                        data: data.clone(),
                    },
                    None => FieldValue::Text(state.value.clone()),
                };
                (state.name.clone(), value)
            })
            .collect()
    }
}

/// In-memory object storage that records every stored object
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Contents stored under a key
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(
        &self,
        key: &str,
        _content_type: Option<Mime>,
        mut body: ByteStreamBody,
        _policy: AccessPolicy,
    ) -> StorageResult<StoredObject> {
        use futures_util::StreamExt;

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        self.objects.lock().insert(key.to_string(), data);

        Ok(StoredObject {
            bucket: "memory".to_string(),
            key: key.to_string(),
            location: format!("https://storage.test/memory/{key}"),
        })
    }
}
