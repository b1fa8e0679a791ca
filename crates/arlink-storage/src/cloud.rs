//! OAuth cloud-disk backend.
//!
//! Talks to a REST disk API with bearer-token auth and a two-step upload:
//! ask the API for an upload href for a path, then PUT the bytes to that
//! href. Download works the same way in reverse. Paths on the disk mirror
//! the tenant-scoped key layout used by the other backends.

use crate::keys::generate_storage_key;
use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use arlink_core::BackendKind;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct HrefResponse {
    href: String,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    size: Option<u64>,
    file: Option<String>,
}

/// Cloud disk storage over an OAuth REST API.
#[derive(Clone)]
pub struct CloudDiskStorage {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl CloudDiskStorage {
    /// # Arguments
    /// * `api_base` - Base URL of the disk resources API
    /// * `token` - OAuth access token for the tenant's disk
    pub fn new(api_base: String, token: String) -> StorageResult<Self> {
        if token.is_empty() {
            return Err(StorageError::ConfigError(
                "Cloud disk OAuth token not configured".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn auth(&self) -> String {
        format!("OAuth {}", self.token)
    }

    fn resource_url(&self, op: &str, storage_key: &str) -> String {
        format!(
            "{}/resources{}?path={}",
            self.api_base,
            op,
            urlencoding::encode(storage_key)
        )
    }

    /// Fetch the resource descriptor for a key; None when the disk reports 404.
    async fn resource(&self, storage_key: &str) -> StorageResult<Option<ResourceResponse>> {
        let response = self
            .client
            .get(self.resource_url("", storage_key))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let resource = response
            .json::<ResourceResponse>()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(Some(resource))
    }

    /// Ensure every ancestor directory of the key exists on the disk.
    async fn ensure_parent_dirs(&self, storage_key: &str) -> StorageResult<()> {
        let mut prefix = String::new();
        let segments: Vec<&str> = storage_key.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            let response = self
                .client
                .put(self.resource_url("", &prefix))
                .header("Authorization", self.auth())
                .send()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;

            // 409 means the directory already exists.
            if !response.status().is_success()
                && response.status() != reqwest::StatusCode::CONFLICT
            {
                return Err(StorageError::BackendError(format!(
                    "Failed to create directory {}: {}",
                    prefix,
                    response.status()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for CloudDiskStorage {
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        let key = generate_storage_key(tenant_id, filename);
        validate_key(&key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.ensure_parent_dirs(&key).await?;

        // Step 1: request an upload href for the path.
        let href = self
            .client
            .get(self.resource_url("/upload", &key))
            .query(&[("overwrite", "true")])
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?
            .json::<HrefResponse>()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?
            .href;

        // Step 2: PUT the bytes to the returned href.
        self.client
            .put(&href)
            .header("Content-Type", content_type.to_string())
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        let url = self.resolve_url(&key)?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Cloud disk upload successful"
        );

        Ok((key, url))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;

        let response = self
            .client
            .get(self.resource_url("/download", storage_key))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }

        let href = response
            .error_for_status()
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .json::<HrefResponse>()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .href;

        let data = self
            .client
            .get(&href)
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(data.to_vec())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;

        let response = self
            .client
            .delete(self.resource_url("", storage_key))
            .query(&[("permanently", "true")])
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }
        response
            .error_for_status()
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        tracing::info!(key = %storage_key, "Cloud disk delete successful");

        Ok(())
    }

    fn resolve_url(&self, storage_key: &str) -> StorageResult<String> {
        validate_key(storage_key)?;
        // Served through the download redirect endpoint; the disk's public
        // href is only valid for a short window.
        Ok(self.resource_url("/download", storage_key))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        Ok(self.resource(storage_key).await?.is_some())
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        validate_key(storage_key)?;
        let resource = self
            .resource(storage_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))?;
        resource
            .size
            .ok_or_else(|| StorageError::BackendError("Resource reports no size".to_string()))
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::CloudDisk
    }
}
