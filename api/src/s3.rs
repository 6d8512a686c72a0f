//! Presigned-URL access to the patch artifact buckets.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use shared::blob::BlobStore;

pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    /// Builds a client from the standard AWS environment (region,
    /// credentials, and `AWS_ENDPOINT_URL` for MinIO-style deployments).
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);
        tracing::info!("S3 client initialized");
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn presign_download(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| anyhow!("invalid presign TTL: {err}"))?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| anyhow!("failed to presign download for {bucket}/{key}: {err}"))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_upload(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| anyhow!("invalid presign TTL: {err}"))?;
        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| anyhow!("failed to presign upload for {bucket}/{key}: {err}"))?;
        Ok(presigned.uri().to_string())
    }
}
