use crate::keys::generate_storage_key;
use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use arlink_core::BackendKind;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutPayload};
use uuid::Uuid;

/// S3-compatible object store backend
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    /// Generate public URL for an object.
    ///
    /// AWS S3 uses virtual-hosted-style; S3-compatible providers get
    /// path-style URLs off the configured endpoint.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    fn map_not_found(err: ObjectStoreError, key: &str) -> StorageError {
        match err {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::BackendError(other.to_string()),
        }
    }

    /// Time-limited presigned GET URL for serving from private buckets.
    pub async fn presigned_get_url(
        &self,
        storage_key: &str,
        expires_in: std::time::Duration,
    ) -> StorageResult<String> {
        use object_store::signer::Signer;

        validate_key(storage_key)?;
        let location = Path::from(storage_key);
        let url = self
            .store
            .signed_url(http::Method::GET, &location, expires_in)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        let key = generate_storage_key(tenant_id, filename);
        validate_key(&key)?;
        let size = data.len() as u64;
        let location = Path::from(key.clone());

        let start = std::time::Instant::now();

        self.store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    "S3 upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        let url = self.generate_url(&key);

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok((key, url))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::map_not_found(e, storage_key))?;

        let data = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(data.to_vec())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key);

        self.store
            .delete(&location)
            .await
            .map_err(|e| Self::map_not_found(e, storage_key))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            "S3 delete successful"
        );

        Ok(())
    }

    fn resolve_url(&self, storage_key: &str) -> StorageResult<String> {
        validate_key(storage_key)?;
        Ok(self.generate_url(storage_key))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key);

        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| Self::map_not_found(e, storage_key))?;

        Ok(meta.size)
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_generation_path_style_for_custom_endpoint() {
        let storage = S3Storage::new(
            "markers".to_string(),
            "us-east-1".to_string(),
            Some("http://localhost:9000".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(
            storage.resolve_url("content/t/a.json").unwrap(),
            "http://localhost:9000/markers/content/t/a.json"
        );
    }

    #[tokio::test]
    async fn url_generation_virtual_hosted_for_aws() {
        let storage = S3Storage::new("markers".to_string(), "eu-west-1".to_string(), None)
            .await
            .unwrap();

        assert_eq!(
            storage.resolve_url("content/t/a.json").unwrap(),
            "https://markers.s3.eu-west-1.amazonaws.com/content/t/a.json"
        );
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let storage = S3Storage::new("markers".to_string(), "us-east-1".to_string(), None)
            .await
            .unwrap();

        assert!(matches!(
            storage.resolve_url("../secrets"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
