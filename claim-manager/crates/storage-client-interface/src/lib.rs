use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageClientError {
    #[error("Failed to publish {size} bytes: {message}")]
    Publish { size: usize, message: String },
}

/// Content-addressed store used to disclose the source data of audited segments.
#[automock]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Should store `data` and return its content address.
    async fn publish(&self, data: Bytes) -> Result<String, StorageClientError>;
}
