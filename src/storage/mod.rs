//! Object storage abstraction for uploaded files
//!
//! The upload pipeline only ever hands storage a key, a content type, and a
//! byte stream; everything provider-specific lives behind [`ObjectStorage`].
//! The S3-compatible backend is in [`s3`].

pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use mime::Mime;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

pub use s3::S3ObjectStorage;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte stream fed into a storage upload
///
/// Chunks arrive as they are parsed off the wire (or read from a temp file);
/// the backend must not require the full body up front.
pub type ByteStreamBody =
    Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error while reading the content to store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider rejected or aborted the upload
    #[error("upload failed: {0}")]
    Upload(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Access policy applied to a stored object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    /// Object is publicly readable at its location URL
    #[default]
    PublicRead,
    /// Object is private to the bucket owner
    Private,
}

/// Metadata for a successfully stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Bucket the object was written to
    pub bucket: String,

    /// Object key within the bucket
    pub key: String,

    /// Public location URL
    pub location: String,
}

/// Trait for object storage backends
///
/// Contract: accept a byte stream, a key, and an access policy; return the
/// eventual stored location. Implementations should stream the body through
/// rather than buffering it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads `body` under `key` and returns the stored location.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream or writing to the provider
    /// fails; the caller treats any failure as fatal for the whole batch.
    async fn put(
        &self,
        key: &str,
        content_type: Option<Mime>,
        body: ByteStreamBody,
        policy: AccessPolicy,
    ) -> StorageResult<StoredObject>;
}
