//! S3-compatible object storage backend
//!
//! Works against AWS S3 proper or any S3-compatible provider (MinIO,
//! DigitalOcean Spaces, ...) via a custom endpoint. Credentials, region, and
//! endpoint come from [`StorageSettings`](crate::config::StorageSettings) at
//! startup.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_smithy_types::body::SdkBody;
use futures_util::TryStreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
use mime::Mime;

use super::{AccessPolicy, ByteStreamBody, ObjectStorage, StorageError, StorageResult, StoredObject};
use crate::config::StorageSettings;

/// Object storage backed by an S3-compatible provider
#[derive(Debug, Clone)]
pub struct S3ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3ObjectStorage {
    /// Builds a client from storage settings.
    pub async fn from_settings(settings: &StorageSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "formwork",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &settings.endpoint {
            // S3-compatible providers generally want path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
        }
    }

    /// Public location URL for a stored key
    fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put(
        &self,
        key: &str,
        content_type: Option<Mime>,
        body: ByteStreamBody,
        policy: AccessPolicy,
    ) -> StorageResult<StoredObject> {
        let stream_body = StreamBody::new(body.map_ok(Frame::data));
        let byte_stream = ByteStream::new(SdkBody::from_body_1_x(stream_body));

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(byte_stream)
            .acl(match policy {
                AccessPolicy::PublicRead => ObjectCannedAcl::PublicRead,
                AccessPolicy::Private => ObjectCannedAcl::Private,
            });
        if let Some(mime) = &content_type {
            request = request.content_type(mime.as_ref());
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        let location = self.object_url(key);
        tracing::debug!(bucket = %self.bucket, key, %location, "object stored");

        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            location,
        })
    }
}
