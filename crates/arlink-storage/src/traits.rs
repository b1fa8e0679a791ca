//! Storage abstraction trait
//!
//! Defines the `Storage` trait that all backends implement. The pipeline
//! works against `Arc<dyn Storage>`, so backends are substitutable without
//! touching caller code.

use arlink_core::BackendKind;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for arlink_core::PipelineError {
    /// Maps the storage taxonomy onto the pipeline taxonomy: missing objects
    /// stay NotFound, malformed keys are caller errors, everything else is a
    /// transient upload failure the job runner may retry.
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => arlink_core::PipelineError::NotFound(key),
            StorageError::InvalidKey(msg) => arlink_core::PipelineError::InvalidInput(msg),
            StorageError::ConfigError(msg) => arlink_core::PipelineError::Internal(msg),
            other => arlink_core::PipelineError::UploadFailure(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (local filesystem, S3, cloud disk) implement this.
/// Selection is per-tenant configuration, resolved once via the factory.
///
/// **Key format:** keys are tenant-scoped: `content/{tenant_id}/{filename}`.
/// See the crate root documentation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload an artifact and return (storage_key, storage_url).
    ///
    /// Fails with `UploadFailed` on I/O or network error; quota enforcement
    /// happens before this call, never inside a backend.
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)>;

    /// Download an artifact by its storage key.
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an artifact by its storage key. `NotFound` when the key does
    /// not exist.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Resolve the publicly servable URL for a storage key.
    fn resolve_url(&self, storage_key: &str) -> StorageResult<String>;

    /// Check whether an artifact exists.
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Size in bytes of a stored artifact.
    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    /// The backend kind this implementation serves.
    fn backend_kind(&self) -> BackendKind;
}

/// Validate that a storage key cannot escape its tenant namespace.
///
/// Shared by all backends; filesystem backends additionally canonicalize.
pub(crate) fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.contains("..") || storage_key.starts_with('/') || storage_key.is_empty() {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
