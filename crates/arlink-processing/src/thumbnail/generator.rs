//! Thumbnail generation: scale inside a scoped temp dir, then upload.
//!
//! Ordering guarantee: the artifact is uploaded only after generation
//! succeeds, and the caller updates the owning row only after the upload
//! succeeds. A row therefore never references a non-existent artifact.

use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use arlink_core::models::StorageLocation;
use arlink_core::{PipelineError, QuotaTracker};
use arlink_storage::Storage;

use super::scaler::MediaScaler;

/// What kind of bytes the thumbnail source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Video,
}

impl SourceKind {
    fn input_filename(self) -> &'static str {
        match self {
            SourceKind::Image => "input.img",
            SourceKind::Video => "input.mp4",
        }
    }
}

#[derive(Clone)]
pub struct ThumbnailGeneratorConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailGeneratorConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
        }
    }
}

/// Produces scaled preview images from source photos or videos.
pub struct ThumbnailGenerator {
    scaler: Arc<dyn MediaScaler>,
    storage: Arc<dyn Storage>,
    quota: QuotaTracker,
    config: ThumbnailGeneratorConfig,
}

impl ThumbnailGenerator {
    pub fn new(
        scaler: Arc<dyn MediaScaler>,
        storage: Arc<dyn Storage>,
        quota: QuotaTracker,
        config: ThumbnailGeneratorConfig,
    ) -> Self {
        Self {
            scaler,
            storage,
            quota,
            config,
        }
    }

    /// Deterministic artifact filename; regeneration overwrites in place.
    pub fn artifact_filename(owner_id: Uuid) -> String {
        format!("{}.thumb.jpg", owner_id)
    }

    /// Generate and upload a thumbnail for `owner_id` (content or video id).
    ///
    /// Returns the uploaded location and its committed byte size. The temp
    /// working area is removed on every exit path, success or not.
    pub async fn generate(
        &self,
        tenant_id: Uuid,
        owner_id: Uuid,
        source: &[u8],
        kind: SourceKind,
    ) -> Result<(StorageLocation, u64), PipelineError> {
        let workdir = TempDir::new()?;
        let input_path = workdir.path().join(kind.input_filename());
        let output_path = workdir.path().join("thumbnail.jpg");

        tokio::fs::write(&input_path, source).await?;

        self.scaler
            .scale(
                &input_path,
                &output_path,
                self.config.width,
                self.config.height,
            )
            .await?;

        let thumbnail = tokio::fs::read(&output_path).await.map_err(|e| {
            PipelineError::ScalerFailure {
                diagnostics: format!("Scaler reported success but produced no output: {}", e),
            }
        })?;
        let size = thumbnail.len() as u64;

        // Reserve before the upload; dropped (released) if the upload fails.
        let reservation =
            self.quota
                .reserve(tenant_id, size)
                .map_err(|e| PipelineError::QuotaExceeded {
                    requested: e.requested,
                    available: e.available,
                })?;

        let filename = Self::artifact_filename(owner_id);
        let (key, url) = self
            .storage
            .upload(tenant_id, &filename, "image/jpeg", thumbnail)
            .await?;

        reservation.commit();

        tracing::info!(
            owner_id = %owner_id,
            key = %key,
            size_bytes = size,
            "Thumbnail generated"
        );

        Ok((
            StorageLocation::new(self.storage.backend_kind(), key, url),
            size,
        ))
    }
}
