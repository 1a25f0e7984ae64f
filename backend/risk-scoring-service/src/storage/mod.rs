use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{Result, RiskServiceError};

/// Object storage for archived event files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `local_path` under `key` and return the object's URI.
    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct S3BlobStore {
    client: Arc<Client>,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from the standard AWS environment (credentials, region,
    /// endpoint overrides).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let aws_config = aws_config::load_from_env().await;
        Self::new(Arc::new(Client::new(&aws_config)), bucket)
    }

    pub fn new(client: Arc<Client>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<String> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| RiskServiceError::Storage(format!("read {}: {e}", local_path.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| RiskServiceError::Storage(format!("put s3://{}/{key}: {e}", self.bucket)))?;

        debug!(bucket = %self.bucket, key, "Uploaded object");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}
