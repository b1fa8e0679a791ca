//! In-memory entity store.
//!
//! Holds tenants, projects, content items and videos behind a single
//! read/write lock. Mutations that must be observed atomically (the active
//! video swap, artifact commits) run entirely inside one write-lock critical
//! section, so no reader ever sees a half-applied transition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use arlink_core::models::{ArtifactStatus, Content, Project, StorageLocation, Tenant, Video};
use arlink_core::PipelineError;

#[derive(Default)]
struct StoreInner {
    tenants: HashMap<Uuid, Tenant>,
    projects: HashMap<Uuid, Project>,
    contents: HashMap<Uuid, Content>,
    videos: HashMap<Uuid, Video>,
    /// public_id -> content id, kept in lockstep with `contents`.
    public_ids: HashMap<String, Uuid>,
}

/// Shared handle to the entity store. Cheap to clone.
#[derive(Clone, Default)]
pub struct ContentStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tenant(&self, tenant: Tenant) {
        self.inner.write().await.tenants.insert(tenant.id, tenant);
    }

    pub async fn tenant(&self, id: Uuid) -> Option<Tenant> {
        self.inner.read().await.tenants.get(&id).cloned()
    }

    /// Insert a project. Name is unique within its tenant.
    pub async fn insert_project(&self, project: Project) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        let clash = inner
            .projects
            .values()
            .any(|p| p.tenant_id == project.tenant_id && p.name == project.name);
        if clash {
            return Err(PipelineError::Conflict(format!(
                "project name '{}' already exists for tenant {}",
                project.name, project.tenant_id
            )));
        }
        inner.projects.insert(project.id, project);
        Ok(())
    }

    pub async fn project(&self, id: Uuid) -> Option<Project> {
        self.inner.read().await.projects.get(&id).cloned()
    }

    pub async fn insert_content(&self, content: Content) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        if inner.public_ids.contains_key(&content.public_id) {
            return Err(PipelineError::Conflict(format!(
                "public id {} already registered",
                content.public_id
            )));
        }
        inner
            .public_ids
            .insert(content.public_id.clone(), content.id);
        inner.contents.insert(content.id, content);
        Ok(())
    }

    pub async fn content(&self, id: Uuid) -> Option<Content> {
        self.inner.read().await.contents.get(&id).cloned()
    }

    pub async fn content_by_public_id(&self, public_id: &str) -> Option<Content> {
        let inner = self.inner.read().await;
        let id = inner.public_ids.get(public_id)?;
        inner.contents.get(id).cloned()
    }

    pub async fn insert_video(&self, video: Video) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        if !inner.contents.contains_key(&video.content_id) {
            return Err(PipelineError::NotFound(format!(
                "content {} for video",
                video.content_id
            )));
        }
        inner.videos.insert(video.id, video);
        Ok(())
    }

    pub async fn video(&self, id: Uuid) -> Option<Video> {
        self.inner.read().await.videos.get(&id).cloned()
    }

    /// Videos attached to a content item, ordered by rotation position, then
    /// upload time as a tie-breaker.
    pub async fn videos_for_content(&self, content_id: Uuid) -> Vec<Video> {
        let inner = self.inner.read().await;
        let mut videos: Vec<Video> = inner
            .videos
            .values()
            .filter(|v| v.content_id == content_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then(a.uploaded_at.cmp(&b.uploaded_at))
        });
        videos
    }

    /// Content items eligible for rotation sweeps.
    pub async fn rotating_contents(&self) -> Vec<Content> {
        self.inner
            .read()
            .await
            .contents
            .values()
            .filter(|c| c.rotation != arlink_core::models::RotationKind::None)
            .cloned()
            .collect()
    }

    /// Atomically make `video_id` the active video of `content_id`.
    ///
    /// The previous active flag is cleared, the new one set and the owning
    /// pointer updated inside one critical section, so at no instant do two
    /// videos of the same content carry `is_active`.
    pub async fn activate_video(
        &self,
        content_id: Uuid,
        video_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;

        let content = inner
            .contents
            .get(&content_id)
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        if content.is_expired(now) {
            return Err(PipelineError::Conflict(format!(
                "content {} is expired",
                content_id
            )));
        }
        let previous = content.active_video;

        let video = inner
            .videos
            .get(&video_id)
            .ok_or_else(|| PipelineError::NotFound(format!("video {}", video_id)))?;
        if video.content_id != content_id {
            return Err(PipelineError::Conflict(format!(
                "video {} does not belong to content {}",
                video_id, content_id
            )));
        }

        if previous == Some(video_id) {
            return Ok(());
        }

        if let Some(prev_id) = previous {
            if let Some(prev) = inner.videos.get_mut(&prev_id) {
                prev.is_active = false;
            }
        }
        if let Some(next) = inner.videos.get_mut(&video_id) {
            next.is_active = true;
        }
        if let Some(content) = inner.contents.get_mut(&content_id) {
            content.active_video = Some(video_id);
            content.updated_at = now;
        }
        Ok(())
    }

    /// Record a freshly uploaded marker artifact on its content row.
    ///
    /// Returns the previous marker location (if any) so the caller can free
    /// the superseded artifact, or `NotFound` when the content was deleted
    /// while the job was in flight.
    pub async fn commit_marker(
        &self,
        content_id: Uuid,
        location: StorageLocation,
        image_hash: String,
    ) -> Result<Option<StorageLocation>, PipelineError> {
        let mut inner = self.inner.write().await;
        let content = inner
            .contents
            .get_mut(&content_id)
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        let previous = content.marker.replace(location);
        content.marker_image_hash = Some(image_hash);
        content.marker_status = ArtifactStatus::Ready;
        content.updated_at = Utc::now();
        Ok(previous)
    }

    /// Record a freshly uploaded thumbnail on its content row. Same contract
    /// as [`commit_marker`](Self::commit_marker).
    pub async fn commit_thumbnail(
        &self,
        content_id: Uuid,
        location: StorageLocation,
    ) -> Result<Option<StorageLocation>, PipelineError> {
        let mut inner = self.inner.write().await;
        let content = inner
            .contents
            .get_mut(&content_id)
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        let previous = content.thumbnail.replace(location);
        content.thumbnail_status = ArtifactStatus::Ready;
        content.updated_at = Utc::now();
        Ok(previous)
    }

    pub async fn set_marker_status(&self, content_id: Uuid, status: ArtifactStatus) {
        let mut inner = self.inner.write().await;
        if let Some(content) = inner.contents.get_mut(&content_id) {
            content.marker_status = status;
            content.updated_at = Utc::now();
        }
    }

    pub async fn set_thumbnail_status(&self, content_id: Uuid, status: ArtifactStatus) {
        let mut inner = self.inner.write().await;
        if let Some(content) = inner.contents.get_mut(&content_id) {
            content.thumbnail_status = status;
            content.updated_at = Utc::now();
        }
    }

    pub async fn set_rotation(
        &self,
        content_id: Uuid,
        rotation: arlink_core::models::RotationKind,
    ) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        let content = inner
            .contents
            .get_mut(&content_id)
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        content.rotation = rotation;
        content.updated_at = Utc::now();
        Ok(())
    }

    pub async fn update_video<F>(&self, video_id: Uuid, f: F) -> Result<Video, PipelineError>
    where
        F: FnOnce(&mut Video),
    {
        let mut inner = self.inner.write().await;
        let video = inner
            .videos
            .get_mut(&video_id)
            .ok_or_else(|| PipelineError::NotFound(format!("video {}", video_id)))?;
        f(video);
        Ok(video.clone())
    }

    /// Remove a content row together with its videos and public-id mapping.
    ///
    /// Returns the removed entities so the caller can free storage and quota.
    pub async fn remove_content(
        &self,
        content_id: Uuid,
    ) -> Result<(Content, Vec<Video>), PipelineError> {
        let mut inner = self.inner.write().await;
        let content = inner
            .contents
            .remove(&content_id)
            .ok_or_else(|| PipelineError::NotFound(format!("content {}", content_id)))?;
        inner.public_ids.remove(&content.public_id);

        let video_ids: Vec<Uuid> = inner
            .videos
            .values()
            .filter(|v| v.content_id == content_id)
            .map(|v| v.id)
            .collect();
        let mut videos = Vec::with_capacity(video_ids.len());
        for id in video_ids {
            if let Some(video) = inner.videos.remove(&id) {
                videos.push(video);
            }
        }
        Ok((content, videos))
    }

    /// Remove a single video, clearing the active pointer if it pointed here.
    pub async fn remove_video(&self, video_id: Uuid) -> Result<Video, PipelineError> {
        let mut inner = self.inner.write().await;
        let video = inner
            .videos
            .remove(&video_id)
            .ok_or_else(|| PipelineError::NotFound(format!("video {}", video_id)))?;
        if let Some(content) = inner.contents.get_mut(&video.content_id) {
            if content.active_video == Some(video_id) {
                content.active_video = None;
            }
        }
        Ok(video)
    }
}
