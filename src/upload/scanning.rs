//! Scanning multipart reader
//!
//! File parts are spooled to temp files under a configured directory, gated
//! by an extension + declared-MIME allow-list filter. After the whole body is
//! parsed, the malware scanner runs once over the batch; any infection fails
//! the request. Clean files are then promoted to object storage and their
//! temp copies removed, so the success path leaves no residue behind.

use mime::Mime;
use multer::Multipart;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::{storage_key, BodyValue, UploadBody, UploadedPart};
use crate::error::UploadError;
use crate::scan::MalwareScanner;
use crate::storage::{AccessPolicy, ByteStreamBody, ObjectStorage};

/// Allow-list filter for file parts
///
/// A part must pass BOTH the extension check and the declared-MIME check;
/// failing either one rejects it, independent of the other. An empty list
/// disables that check.
#[derive(Debug, Clone, Default)]
pub struct PartFilter {
    extensions: Vec<String>,
    types: Vec<String>,
}

impl PartFilter {
    /// Builds a filter from allow-lists. Extensions are matched without the
    /// dot and case-insensitively; MIME entries may use `type/*` wildcards.
    #[must_use]
    pub fn new(
        extensions: impl IntoIterator<Item = String>,
        types: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            types: types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether a part with this file name and declared content type passes
    #[must_use]
    pub fn accepts(&self, file_name: &str, content_type: Option<&Mime>) -> bool {
        self.extension_allowed(file_name) && self.type_allowed(content_type)
    }

    fn extension_allowed(&self, file_name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    fn type_allowed(&self, content_type: Option<&Mime>) -> bool {
        if self.types.is_empty() {
            return true;
        }
        let Some(mime) = content_type else {
            return false;
        };
        self.types.iter().any(|allowed| {
            if let Some(prefix) = allowed.strip_suffix("/*") {
                mime.type_().as_str().eq_ignore_ascii_case(prefix)
            } else {
                allowed.eq_ignore_ascii_case(mime.essence_str())
            }
        })
    }
}

/// Reads a multipart body through the spool-scan-store pipeline.
///
/// # Errors
///
/// Fails on malformed multipart input, temp-file I/O errors, scanner
/// failure, any detected infection ([`UploadError::InfectedContent`]), or a
/// failed storage upload of a clean file.
pub async fn read_scanned_body(
    mut multipart: Multipart<'static>,
    temp_dir: &Path,
    filter: &PartFilter,
    scanner: &dyn MalwareScanner,
    storage: Arc<dyn ObjectStorage>,
    policy: AccessPolicy,
) -> Result<UploadBody, UploadError> {
    tokio::fs::create_dir_all(temp_dir).await?;

    let mut body = UploadBody::default();
    let mut temp_paths: Vec<PathBuf> = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            super::drain_field(&mut field).await?;
            continue;
        };

        let Some(file_name) = field.file_name().map(str::to_owned) else {
            let text = field.text().await?;
            body.push(name, BodyValue::Text(text));
            continue;
        };

        let content_type = field.content_type().cloned();
        if !filter.accepts(&file_name, content_type.as_ref()) {
            tracing::warn!(field = %name, file = %file_name, "rejected by upload filter");
            super::drain_field(&mut field).await?;
            continue;
        }

        let temp_path = temp_dir.join(format!(
            "{}_{}",
            Uuid::new_v4(),
            file_name.replace(['/', '\\'], "_")
        ));
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        temp_paths.push(temp_path.clone());

        body.push(
            name.clone(),
            BodyValue::File(UploadedPart {
                field_name: name,
                file_name: file_name.clone(),
                content_type: content_type.map(|m| m.to_string()),
                key: storage_key(&file_name),
                size,
                location: None,
                temp_path: Some(temp_path),
            }),
        );
    }

    if !temp_paths.is_empty() {
        let infected = scanner.scan(&temp_paths).await?;
        if infected > 0 {
            // Infected temp files are the scanner's to remove (its
            // remove-infected flag); the request fails outright.
            tracing::warn!(infected, files = temp_paths.len(), "infected upload rejected");
            return Err(UploadError::InfectedContent { infected });
        }
    }

    // Clean batch: promote each temp file to storage, then drop the temp copy
    let jobs: Vec<(String, PathBuf, Option<String>)> = body
        .files()
        .iter()
        .filter_map(|part| {
            part.temp_path
                .clone()
                .map(|path| (part.key.clone(), path, part.content_type.clone()))
        })
        .collect();

    let mut locations = HashMap::new();
    for (key, temp_path, content_type) in jobs {
        let file = tokio::fs::File::open(&temp_path).await?;
        let stream: ByteStreamBody = Box::pin(ReaderStream::new(file));
        let mime = content_type.and_then(|raw| raw.parse::<Mime>().ok());
        let stored = storage.put(&key, mime, stream, policy).await?;
        locations.insert(key, stored.location);

        if let Err(error) = tokio::fs::remove_file(&temp_path).await {
            tracing::warn!(%error, path = %temp_path.display(), "failed to remove temp file");
        }
    }
    body.annotate_locations(&locations);

    Ok(body)
}
