//! Streaming multipart reader
//!
//! Each file part is piped chunk-by-chunk into a storage upload task spawned
//! as soon as the part's headers arrive, so later parts keep parsing while
//! earlier uploads are still in flight. An all-complete barrier joins the
//! tasks after the final boundary; any failed upload fails the whole read.

use bytes::Bytes;
use multer::Multipart;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::{storage_key, BodyValue, UploadBody, UploadedPart};
use crate::error::UploadError;
use crate::storage::{AccessPolicy, ByteStreamBody, ObjectStorage, StorageError, StorageResult, StoredObject};

/// Upload task channel depth; bounds how far parsing can run ahead of a slow
/// storage backend.
const CHANNEL_CAPACITY: usize = 16;

/// Reads a multipart body, streaming file parts straight into storage.
///
/// Plain fields are buffered as text; repeated names collapse into ordered
/// lists. On success every file entry carries its stored location.
///
/// # Errors
///
/// Fails on malformed multipart input or when any storage upload task fails;
/// a single failed part fails the aggregate result.
pub async fn read_streaming_body(
    mut multipart: Multipart<'static>,
    storage: Arc<dyn ObjectStorage>,
    policy: AccessPolicy,
) -> Result<UploadBody, UploadError> {
    let mut body = UploadBody::default();
    let mut uploads: Vec<JoinHandle<StorageResult<StoredObject>>> = Vec::new();

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
        let key = storage_key(&file_name);

        let (sender, receiver) = mpsc::channel::<std::io::Result<Bytes>>(CHANNEL_CAPACITY);
        let task = {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            let content_type = content_type.clone();
            tokio::spawn(async move {
                let stream: ByteStreamBody = Box::pin(ReceiverStream::new(receiver));
                storage.put(&key, content_type, stream, policy).await
            })
        };

        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            if sender.send(Ok(chunk)).await.is_err() {
                // Upload task hung up early; its error surfaces at the barrier
                break;
            }
        }
        drop(sender);
        uploads.push(task);

        body.push(
            name.clone(),
            BodyValue::File(UploadedPart {
                field_name: name,
                file_name,
                content_type: content_type.map(|m| m.to_string()),
                key,
                size,
                location: None,
                temp_path: None,
            }),
        );
    }

    // All-complete barrier over the in-flight uploads
    let mut locations = HashMap::new();
    for task in uploads {
        let stored = task
            .await
            .map_err(|e| StorageError::Other(format!("upload task failed: {e}")))??;
        locations.insert(stored.key.clone(), stored.location.clone());
    }
    body.annotate_locations(&locations);

    tracing::debug!(
        fields = body.entries.len(),
        files = locations.len(),
        "multipart body streamed to storage"
    );
    Ok(body)
}
