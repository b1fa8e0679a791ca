#[cfg(feature = "storage-cloud")]
use crate::CloudDiskStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageError, StorageResult};
use arlink_core::{BackendKind, StorageConfig};
use std::sync::Arc;

/// Create a storage backend based on per-tenant configuration.
///
/// Resolved once per tenant; callers hold the returned `Arc<dyn Storage>`
/// and never branch on the backend kind again.
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        BackendKind::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint.clone();

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        BackendKind::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        BackendKind::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        BackendKind::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-cloud")]
        BackendKind::CloudDisk => {
            let api_base = config.cloud_disk_api_base.clone().ok_or_else(|| {
                StorageError::ConfigError("CLOUD_DISK_API_BASE not configured".to_string())
            })?;
            let token = config.cloud_disk_token.clone().ok_or_else(|| {
                StorageError::ConfigError("CLOUD_DISK_TOKEN not configured".to_string())
            })?;

            let storage = CloudDiskStorage::new(api_base, token)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-cloud"))]
        BackendKind::CloudDisk => Err(StorageError::ConfigError(
            "Cloud disk backend not available (storage-cloud feature not enabled)".to_string(),
        )),
    }
}
