//! Job handlers: the glue between the queue and the generators.
//!
//! Each handler re-reads the content row at the start of the attempt and
//! again at commit time, so a content item deleted mid-flight cancels the
//! job instead of resurrecting rows; anything already uploaded is rolled
//! back (artifact deleted, quota released).

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use arlink_core::models::{ArtifactStatus, Content, Job, JobKind, StorageLocation};
use arlink_core::{JobError, PipelineError, QuotaTracker};
use arlink_processing::marker::{MarkerGenerator, MarkerOutcome};
use arlink_processing::thumbnail::{SourceKind, ThumbnailGenerator};
use arlink_storage::{generate_storage_key, Storage};
use arlink_worker::JobHandlerContext;

use crate::store::ContentStore;

pub struct PipelineContext {
    store: ContentStore,
    storage: Arc<dyn Storage>,
    quota: QuotaTracker,
    marker: MarkerGenerator,
    thumbnail: ThumbnailGenerator,
}

impl PipelineContext {
    pub fn new(
        store: ContentStore,
        storage: Arc<dyn Storage>,
        quota: QuotaTracker,
        marker: MarkerGenerator,
        thumbnail: ThumbnailGenerator,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            storage,
            quota,
            marker,
            thumbnail,
        })
    }

    async fn run_marker_job(&self, content: &Content) -> Result<serde_json::Value> {
        // Size whatever already sits at the deterministic key before the
        // generator overwrites it. The row can lag behind the object when a
        // previous attempt was cut off between upload and row update, so the
        // key itself is the source of truth for the quota delta.
        let marker_key = generate_storage_key(
            content.tenant_id,
            &MarkerGenerator::artifact_filename(content.id),
        );
        let previous_size = self.storage.content_length(&marker_key).await.ok();

        let source = self.download_source(content).await?;
        let outcome = self
            .marker
            .generate(content, &source)
            .await
            .map_err(JobError::from)?;

        match outcome {
            MarkerOutcome::Unchanged { location } => Ok(json!({
                "status": "unchanged",
                "key": location.key,
            })),
            MarkerOutcome::Generated {
                location,
                image_hash,
                artifact_size,
                ..
            } => {
                let committed = self
                    .store
                    .commit_marker(content.id, location.clone(), image_hash)
                    .await;
                match committed {
                    Ok(previous) => {
                        self.settle_replacement(content, previous, &location, previous_size)
                            .await;
                        Ok(json!({
                            "status": "generated",
                            "key": location.key,
                            "size_bytes": artifact_size,
                        }))
                    }
                    Err(PipelineError::NotFound(_)) => {
                        self.roll_back_upload(content, &location, artifact_size).await;
                        Ok(json!({ "status": "cancelled" }))
                    }
                    Err(e) => Err(JobError::from(e).into()),
                }
            }
        }
    }

    async fn run_thumbnail_job(&self, content: &Content) -> Result<serde_json::Value> {
        let thumbnail_key = generate_storage_key(
            content.tenant_id,
            &ThumbnailGenerator::artifact_filename(content.id),
        );
        let previous_size = self.storage.content_length(&thumbnail_key).await.ok();

        let source = self.download_source(content).await?;
        let (location, size) = self
            .thumbnail
            .generate(content.tenant_id, content.id, &source, SourceKind::Image)
            .await
            .map_err(JobError::from)?;

        let committed = self
            .store
            .commit_thumbnail(content.id, location.clone())
            .await;
        match committed {
            Ok(previous) => {
                self.settle_replacement(content, previous, &location, previous_size)
                    .await;
                Ok(json!({
                    "status": "generated",
                    "key": location.key,
                    "size_bytes": size,
                }))
            }
            Err(PipelineError::NotFound(_)) => {
                self.roll_back_upload(content, &location, size).await;
                Ok(json!({ "status": "cancelled" }))
            }
            Err(e) => Err(JobError::from(e).into()),
        }
    }

    async fn download_source(&self, content: &Content) -> Result<Vec<u8>> {
        let bytes = self
            .storage
            .download(&content.source_image.key)
            .await
            .map_err(|e| JobError::from(PipelineError::from(e)))?;
        Ok(bytes)
    }

    /// After a successful commit, free whatever the new artifact replaced.
    /// A regeneration writes to the same deterministic key, so the usual
    /// case is a quota adjustment only; a stray old key is also deleted.
    /// `previous_size` was read from the key itself, so bytes left behind by
    /// a cut-off attempt (row never updated) are settled here too.
    async fn settle_replacement(
        &self,
        content: &Content,
        previous: Option<StorageLocation>,
        current: &StorageLocation,
        previous_size: Option<u64>,
    ) {
        if let Some(size) = previous_size {
            self.quota.release_bytes(content.tenant_id, size);
        }
        let Some(previous) = previous else { return };
        if previous.key != current.key {
            if let Err(e) = self.storage.delete(&previous.key).await {
                tracing::warn!(
                    key = %previous.key,
                    error = %e,
                    "Superseded artifact delete failed"
                );
            }
        }
    }

    /// The owning row vanished between upload and commit: undo the write.
    async fn roll_back_upload(&self, content: &Content, location: &StorageLocation, size: u64) {
        tracing::info!(
            content_id = %content.id,
            key = %location.key,
            "Content deleted mid-flight; rolling back artifact"
        );
        self.quota.release_bytes(content.tenant_id, size);
        if let Err(e) = self.storage.delete(&location.key).await {
            tracing::warn!(key = %location.key, error = %e, "Rollback delete failed");
        }
    }
}

#[async_trait]
impl JobHandlerContext for PipelineContext {
    async fn run_job(self: Arc<Self>, job: &Job) -> Result<serde_json::Value> {
        let Some(content) = self.store.content(job.content_id).await else {
            // Deleted before the attempt started; nothing to undo.
            return Ok(json!({ "status": "cancelled" }));
        };
        if content.is_expired(Utc::now()) {
            return Ok(json!({ "status": "skipped_expired" }));
        }

        match job.kind {
            JobKind::Marker => self.run_marker_job(&content).await,
            JobKind::Thumbnail => self.run_thumbnail_job(&content).await,
        }
    }

    async fn on_terminal_failure(self: Arc<Self>, job: &Job, error: &str) {
        tracing::error!(
            content_id = %job.content_id,
            kind = %job.kind,
            error = %error,
            "Job failed terminally; marking artifact failed"
        );
        match job.kind {
            JobKind::Marker => {
                self.store
                    .set_marker_status(job.content_id, ArtifactStatus::Failed)
                    .await
            }
            JobKind::Thumbnail => {
                self.store
                    .set_thumbnail_status(job.content_id, ArtifactStatus::Failed)
                    .await
            }
        }
    }
}
