use std::time::Duration;

use async_trait::async_trait;

/// Lifetime of presigned download links.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(60 * 5);
/// Lifetime of presigned reupload targets.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(60 * 10);

/// Object-storage collaborator.
///
/// Implementations only sign time-boxed URLs; the lifecycle engine never
/// streams artifact bytes itself. An upload target signed here is inert
/// until the caller confirms the upload succeeded.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn presign_download(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> anyhow::Result<String>;

    async fn presign_upload(&self, bucket: &str, key: &str, ttl: Duration)
        -> anyhow::Result<String>;
}
