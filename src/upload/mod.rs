//! Multipart upload pipeline
//!
//! Accepts an incoming request body and produces a normalized fields/files
//! result ([`UploadBody`]). Multipart bodies are handled by one of two
//! variants:
//!
//! - [`streaming::read_streaming_body`] pipes each file part directly into an
//!   object-storage upload task, no full buffering;
//! - [`scanning::read_scanned_body`] spools file parts to temp files, runs a
//!   batch malware scan, and only then promotes clean files to storage.
//!
//! Non-multipart bodies (JSON, urlencoded) go through the plain readers in
//! this module.

pub mod scanning;
pub mod streaming;

use chrono::Utc;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::UploadError;

/// A file part collected from a multipart body
#[derive(Debug, Clone, Serialize)]
pub struct UploadedPart {
    /// Multipart field name
    pub field_name: String,

    /// Client-declared file name
    pub file_name: String,

    /// Client-declared content type
    pub content_type: Option<String>,

    /// Storage key the file is (or will be) stored under
    pub key: String,

    /// Bytes received for this part
    pub size: u64,

    /// Final stored location, filled in once the upload completes
    pub location: Option<String>,

    /// Temp file holding the part in the scanning variant; cleared once the
    /// file is promoted to storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_path: Option<PathBuf>,
}

/// One value in the fields/files result
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BodyValue {
    /// Plain field, buffered as text
    Text(String),
    /// File part
    File(UploadedPart),
    /// Repeated field names collapse into an ordered list
    Many(Vec<BodyValue>),
}

/// Normalized fields-and-files result, keyed by field name
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadBody {
    /// Entries keyed by field name
    #[serde(flatten)]
    pub entries: HashMap<String, BodyValue>,
}

impl UploadBody {
    /// Adds a value under `name`, collapsing repeats into a `Many` list in
    /// arrival order.
    pub fn push(&mut self, name: String, value: BodyValue) {
        match self.entries.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                BodyValue::Many(list) => list.push(value),
                existing => {
                    let first = existing.clone();
                    *existing = BodyValue::Many(vec![first, value]);
                }
            },
        }
    }

    /// Looks up an entry by field name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BodyValue> {
        self.entries.get(name)
    }

    /// The entry's text value, when it is a plain field
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.entries.get(name) {
            Some(BodyValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// All file parts, including those nested in repeated-name lists
    #[must_use]
    pub fn files(&self) -> Vec<&UploadedPart> {
        fn collect<'a>(value: &'a BodyValue, out: &mut Vec<&'a UploadedPart>) {
            match value {
                BodyValue::File(part) => out.push(part),
                BodyValue::Many(list) => {
                    for item in list {
                        collect(item, out);
                    }
                }
                BodyValue::Text(_) => {}
            }
        }

        let mut out = Vec::new();
        for value in self.entries.values() {
            collect(value, &mut out);
        }
        out
    }

    /// Records stored locations onto the matching file parts (by storage
    /// key) and drops their temp paths.
    pub(crate) fn annotate_locations(&mut self, locations: &HashMap<String, String>) {
        fn annotate(value: &mut BodyValue, locations: &HashMap<String, String>) {
            match value {
                BodyValue::File(part) => {
                    if let Some(location) = locations.get(&part.key) {
                        part.location = Some(location.clone());
                        part.temp_path = None;
                    }
                }
                BodyValue::Many(list) => {
                    for item in list {
                        annotate(item, locations);
                    }
                }
                BodyValue::Text(_) => {}
            }
        }

        for value in self.entries.values_mut() {
            annotate(value, locations);
        }
    }
}

/// Consumes and discards the rest of a part so parsing can advance to the
/// next boundary.
pub(crate) async fn drain_field(field: &mut multer::Field<'_>) -> Result<(), multer::Error> {
    while field.chunk().await?.is_some() {}
    Ok(())
}

/// Derives a storage key from a client file name:
/// `{stem}_{unix-millis}{.ext}`, spaces replaced with underscores.
#[must_use]
pub fn storage_key(file_name: &str) -> String {
    let (stem, ext) = match file_name.rfind('.') {
        Some(index) if index > 0 => file_name.split_at(index),
        _ => (file_name, ""),
    };
    format!("{stem}_{}{ext}", Utc::now().timestamp_millis()).replace(' ', "_")
}

/// Parses a JSON object body into a fields result.
///
/// String members stay as-is, arrays become ordered lists, and everything
/// else keeps its JSON rendering.
///
/// # Errors
///
/// Returns an error for invalid JSON or a non-object top level.
pub fn read_json_body(bytes: &[u8]) -> Result<UploadBody, UploadError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let serde_json::Value::Object(map) = value else {
        return Err(UploadError::BodyRead(
            "JSON body must be an object".to_string(),
        ));
    };

    let mut body = UploadBody::default();
    for (name, member) in map {
        body.push(name, json_member(member));
    }
    Ok(body)
}

fn json_member(value: serde_json::Value) -> BodyValue {
    match value {
        serde_json::Value::String(text) => BodyValue::Text(text),
        serde_json::Value::Array(items) => {
            BodyValue::Many(items.into_iter().map(json_member).collect())
        }
        other => BodyValue::Text(other.to_string()),
    }
}

/// Parses a urlencoded body into a fields result.
///
/// # Errors
///
/// Returns an error when the body is not valid urlencoded data.
pub fn read_urlencoded_body(bytes: &[u8]) -> Result<UploadBody, UploadError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)?;
    let mut body = UploadBody::default();
    for (name, value) in pairs {
        body.push(name, BodyValue::Text(value));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_collapse_in_order() {
        let mut body = UploadBody::default();
        body.push("tag".to_string(), BodyValue::Text("one".to_string()));
        body.push("tag".to_string(), BodyValue::Text("two".to_string()));
        body.push("tag".to_string(), BodyValue::Text("three".to_string()));

        match body.get("tag").unwrap() {
            BodyValue::Many(list) => {
                let texts: Vec<_> = list
                    .iter()
                    .filter_map(|v| match v {
                        BodyValue::Text(t) => Some(t.as_str()),
                        _ => None,
                    })
                    .collect();
                assert_eq!(texts, vec!["one", "two", "three"]);
            }
            other => panic!("expected Many, got {other:?}"),
        }
    }

    #[test]
    fn single_value_stays_scalar() {
        let mut body = UploadBody::default();
        body.push("title".to_string(), BodyValue::Text("hello".to_string()));
        assert_eq!(body.text("title"), Some("hello"));
    }

    #[test]
    fn storage_key_shape() {
        let key = storage_key("my photo.jpg");
        assert!(key.starts_with("my_photo_"));
        assert!(key.ends_with(".jpg"));
        assert!(!key.contains(' '));

        let bare = storage_key("README");
        assert!(bare.starts_with("README_"));
        assert!(!bare.contains('.'));

        // A leading dot is part of the name, not an extension separator
        let dotted = storage_key(".env");
        assert!(dotted.starts_with(".env_"));
    }

    #[test]
    fn json_body_reader() {
        let body = read_json_body(br#"{"name":"frog","count":3,"tags":["a","b"]}"#).unwrap();
        assert_eq!(body.text("name"), Some("frog"));
        assert_eq!(body.text("count"), Some("3"));
        assert!(matches!(body.get("tags"), Some(BodyValue::Many(list)) if list.len() == 2));
    }

    #[test]
    fn json_body_must_be_object() {
        assert!(matches!(
            read_json_body(br#"["not","an","object"]"#),
            Err(UploadError::BodyRead(_))
        ));
        assert!(matches!(
            read_json_body(b"{ not json"),
            Err(UploadError::Json(_))
        ));
    }

    #[test]
    fn urlencoded_body_reader() {
        let body = read_urlencoded_body(b"name=frog&tag=a&tag=b").unwrap();
        assert_eq!(body.text("name"), Some("frog"));
        assert!(matches!(body.get("tag"), Some(BodyValue::Many(list)) if list.len() == 2));
    }

    #[test]
    fn files_walks_nested_lists() {
        let part = |key: &str| {
            BodyValue::File(UploadedPart {
                field_name: "file".to_string(),
                file_name: "a.txt".to_string(),
                content_type: None,
                key: key.to_string(),
                size: 0,
                location: None,
                temp_path: None,
            })
        };

        let mut body = UploadBody::default();
        body.push("file".to_string(), part("one"));
        body.push("file".to_string(), part("two"));
        body.push("note".to_string(), BodyValue::Text("text".to_string()));

        let keys: Vec<_> = body.files().iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"one"));
        assert!(keys.contains(&"two"));
    }

    #[test]
    fn annotate_locations_by_key() {
        let mut body = UploadBody::default();
        body.push(
            "file".to_string(),
            BodyValue::File(UploadedPart {
                field_name: "file".to_string(),
                file_name: "a.txt".to_string(),
                content_type: None,
                key: "a_1.txt".to_string(),
                size: 4,
                location: None,
                temp_path: Some(PathBuf::from("/tmp/x")),
            }),
        );

        let mut locations = HashMap::new();
        locations.insert("a_1.txt".to_string(), "https://cdn/a_1.txt".to_string());
        body.annotate_locations(&locations);

        let files = body.files();
        assert_eq!(files[0].location.as_deref(), Some("https://cdn/a_1.txt"));
        assert!(files[0].temp_path.is_none());
    }
}
