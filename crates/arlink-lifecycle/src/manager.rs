//! Content lifecycle manager.
//!
//! Owns the write paths of the content graph: ingest, video attachment,
//! activation and deletion. Activation is linearized per content item so two
//! concurrent requests can never leave two active videos behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use arlink_core::models::{
    Content, DurationYears, Project, StorageLocation, Tenant, TenantStatus, Video,
};
use arlink_core::{PipelineError, QuotaTracker};
use arlink_processing::validate_source_image;
use arlink_storage::Storage;

use crate::store::ContentStore;

/// Optional attributes for a video upload.
#[derive(Debug, Clone, Default)]
pub struct VideoUpload {
    /// Position in the daily-rotation cycle.
    pub order_index: u32,
    /// For dated rotation: activate on or after this instant.
    pub activate_on: Option<DateTime<Utc>>,
}

pub struct LifecycleManager {
    store: ContentStore,
    storage: Arc<dyn Storage>,
    quota: QuotaTracker,
    /// Per-content activation locks, created lazily and dropped with the
    /// content item.
    activation_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LifecycleManager {
    pub fn new(store: ContentStore, storage: Arc<dyn Storage>, quota: QuotaTracker) -> Self {
        Self {
            store,
            storage,
            quota,
            activation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Register a tenant and its byte allowance with the quota tracker.
    pub async fn register_tenant(&self, tenant: Tenant) {
        self.quota.set_limit(tenant.id, tenant.storage_quota_bytes);
        tracing::info!(
            tenant_id = %tenant.id,
            name = %tenant.name,
            quota_bytes = tenant.storage_quota_bytes,
            "Tenant registered"
        );
        self.store.insert_tenant(tenant).await;
    }

    pub async fn create_project(
        &self,
        tenant_id: Uuid,
        name: impl Into<String>,
    ) -> Result<Project, PipelineError> {
        let project = Project::new(tenant_id, name);
        self.store.insert_project(project.clone()).await?;
        Ok(project)
    }

    /// Ingest a source photo and create its content row.
    ///
    /// The photo is validated, charged against the tenant's quota and
    /// uploaded before the row becomes visible; on any failure nothing is
    /// left behind. Marker and thumbnail jobs are the caller's to enqueue.
    pub async fn create_content(
        &self,
        project_id: Uuid,
        customer_name: impl Into<String>,
        duration: DurationYears,
        photo: Vec<u8>,
        content_type: &str,
    ) -> Result<Content, PipelineError> {
        let project = self
            .store
            .project(project_id)
            .await
            .ok_or_else(|| PipelineError::NotFound(format!("project {}", project_id)))?;
        self.require_active_tenant(project.tenant_id).await?;

        validate_source_image(&photo)?;

        let size = photo.len() as u64;
        let reservation = self
            .quota
            .reserve(project.tenant_id, size)
            .map_err(|e| PipelineError::QuotaExceeded {
                requested: e.requested,
                available: e.available,
            })?;

        let content_id = Uuid::new_v4();
        let filename = format!("{}.source.img", content_id);
        let (key, url) = self
            .storage
            .upload(project.tenant_id, &filename, content_type, photo)
            .await?;
        reservation.commit();

        let mut content = Content::new(
            project_id,
            project.tenant_id,
            customer_name,
            duration,
            StorageLocation::new(self.storage.backend_kind(), key, url),
        );
        content.id = content_id;
        self.store.insert_content(content.clone()).await?;

        tracing::info!(
            content_id = %content.id,
            tenant_id = %content.tenant_id,
            public_id = %content.public_id,
            size_bytes = size,
            "Content created"
        );
        Ok(content)
    }

    /// Attach a video to a content item.
    ///
    /// The video's subscription window defaults to the content's own expiry.
    pub async fn add_video(
        &self,
        content_id: Uuid,
        data: Vec<u8>,
        upload: VideoUpload,
    ) -> Result<Video, PipelineError> {
        let now = Utc::now();
        let content = self
            .store
            .content(content_id)
            .await
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        if content.is_expired(now) {
            return Err(PipelineError::Conflict(format!(
                "content {} is expired",
                content_id
            )));
        }
        self.require_active_tenant(content.tenant_id).await?;

        let size = data.len() as u64;
        let reservation = self
            .quota
            .reserve(content.tenant_id, size)
            .map_err(|e| PipelineError::QuotaExceeded {
                requested: e.requested,
                available: e.available,
            })?;

        let video_id = Uuid::new_v4();
        let filename = format!("{}.mp4", video_id);
        let (key, url) = self
            .storage
            .upload(content.tenant_id, &filename, "video/mp4", data)
            .await?;
        reservation.commit();

        let mut video = Video::new(
            content_id,
            content.tenant_id,
            StorageLocation::new(self.storage.backend_kind(), key, url),
            size,
            content.expires_at(),
        );
        video.id = video_id;
        video.order_index = upload.order_index;
        video.activate_on = upload.activate_on;
        self.store.insert_video(video.clone()).await?;

        tracing::info!(
            video_id = %video.id,
            content_id = %content_id,
            size_bytes = size,
            "Video attached"
        );
        Ok(video)
    }

    /// Make `video_id` the active video of `content_id`.
    ///
    /// Requests for the same content are serialized through a per-content
    /// lock; the flag swap itself is atomic inside the store.
    pub async fn activate(&self, content_id: Uuid, video_id: Uuid) -> Result<(), PipelineError> {
        let lock = self.activation_lock(content_id).await;
        let _guard = lock.lock().await;

        self.store
            .activate_video(content_id, video_id, Utc::now())
            .await?;
        tracing::info!(
            content_id = %content_id,
            video_id = %video_id,
            "Active video switched"
        );
        Ok(())
    }

    /// Delete a video, returning its bytes to the tenant's allowance.
    pub async fn delete_video(&self, video_id: Uuid) -> Result<(), PipelineError> {
        let video = self.store.remove_video(video_id).await?;
        self.quota.release_bytes(video.tenant_id, video.file_size);
        self.delete_artifact(video.tenant_id, &video.storage, false)
            .await;
        if let Some(thumbnail) = &video.thumbnail {
            self.delete_artifact(video.tenant_id, thumbnail, true).await;
        }
        tracing::info!(video_id = %video_id, "Video deleted");
        Ok(())
    }

    /// Delete a content item, its videos and every stored artifact.
    ///
    /// The row disappears first, which cancels in-flight marker/thumbnail
    /// jobs at their commit point. Storage deletes are best-effort; quota is
    /// released regardless so a flaky backend can never strand allowance.
    pub async fn delete_content(&self, content_id: Uuid) -> Result<(), PipelineError> {
        let (content, videos) = self.store.remove_content(content_id).await?;
        let tenant_id = content.tenant_id;
        self.activation_locks.lock().await.remove(&content_id);

        self.delete_artifact(tenant_id, &content.source_image, true)
            .await;
        if let Some(marker) = &content.marker {
            self.delete_artifact(tenant_id, marker, true).await;
        }
        if let Some(thumbnail) = &content.thumbnail {
            self.delete_artifact(tenant_id, thumbnail, true).await;
        }
        for video in &videos {
            self.quota.release_bytes(tenant_id, video.file_size);
            self.delete_artifact(tenant_id, &video.storage, false).await;
            if let Some(thumbnail) = &video.thumbnail {
                self.delete_artifact(tenant_id, thumbnail, true).await;
            }
        }

        tracing::info!(
            content_id = %content_id,
            videos = videos.len(),
            "Content deleted"
        );
        Ok(())
    }

    /// Suspended and deleted tenants keep read access but take no new bytes.
    async fn require_active_tenant(&self, tenant_id: Uuid) -> Result<(), PipelineError> {
        let tenant = self
            .store
            .tenant(tenant_id)
            .await
            .ok_or_else(|| PipelineError::NotFound(format!("tenant {}", tenant_id)))?;
        if tenant.status != TenantStatus::Active {
            return Err(PipelineError::Conflict(format!(
                "tenant {} is {}",
                tenant_id, tenant.status
            )));
        }
        Ok(())
    }

    async fn activation_lock(&self, content_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.activation_locks.lock().await;
        locks.entry(content_id).or_default().clone()
    }

    /// Best-effort artifact removal. When `release_quota` is set, the stored
    /// size is read back before the delete and returned to the allowance.
    async fn delete_artifact(
        &self,
        tenant_id: Uuid,
        location: &StorageLocation,
        release_quota: bool,
    ) {
        if release_quota {
            match self.storage.content_length(&location.key).await {
                Ok(size) => self.quota.release_bytes(tenant_id, size),
                Err(e) => tracing::warn!(
                    key = %location.key,
                    error = %e,
                    "Could not size artifact before delete; quota not released"
                ),
            }
        }
        if let Err(e) = self.storage.delete(&location.key).await {
            tracing::warn!(key = %location.key, error = %e, "Artifact delete failed");
        }
    }
}
