//! Marker generation: validate → compile → upload, idempotent per
//! (content, image hash).

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use arlink_core::models::{ArtifactStatus, Content, MarkerArtifact, StorageLocation};
use arlink_core::{PipelineError, QuotaTracker};
use arlink_storage::Storage;

use super::compiler::MarkerCompiler;
use crate::validate::validate_source_image;

#[derive(Clone)]
pub struct MarkerGeneratorConfig {
    pub max_features: u32,
}

impl Default for MarkerGeneratorConfig {
    fn default() -> Self {
        Self { max_features: 1000 }
    }
}

/// Result of a generation request.
#[derive(Debug)]
pub enum MarkerOutcome {
    /// The stored marker already matches this image; nothing was written.
    Unchanged { location: StorageLocation },
    /// A new artifact was compiled and uploaded. `artifact_size` bytes were
    /// committed against the tenant's quota.
    Generated {
        location: StorageLocation,
        image_hash: String,
        artifact: MarkerArtifact,
        artifact_size: u64,
    },
}

/// Produces tracking-marker artifacts from source photos.
///
/// Quota ordering: the reservation is taken before the artifact upload and
/// committed only after the upload succeeds; every failure path releases it.
pub struct MarkerGenerator {
    compiler: Arc<dyn MarkerCompiler>,
    storage: Arc<dyn Storage>,
    quota: QuotaTracker,
    config: MarkerGeneratorConfig,
}

impl MarkerGenerator {
    pub fn new(
        compiler: Arc<dyn MarkerCompiler>,
        storage: Arc<dyn Storage>,
        quota: QuotaTracker,
        config: MarkerGeneratorConfig,
    ) -> Self {
        Self {
            compiler,
            storage,
            quota,
            config,
        }
    }

    /// SHA-256 idempotency hash of the source image bytes.
    pub fn image_hash(image_bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(image_bytes))
    }

    /// Deterministic artifact filename; regeneration overwrites in place.
    pub fn artifact_filename(content_id: Uuid) -> String {
        format!("{}.marker.json", content_id)
    }

    /// Generate (or reuse) the marker for `content` from `image_bytes`.
    ///
    /// When the content's stored hash matches and its marker is ready, the
    /// existing reference is returned with zero additional writes.
    pub async fn generate(
        &self,
        content: &Content,
        image_bytes: &[u8],
    ) -> Result<MarkerOutcome, PipelineError> {
        let hash = Self::image_hash(image_bytes);

        if content.marker_status == ArtifactStatus::Ready
            && content.marker_image_hash.as_deref() == Some(hash.as_str())
        {
            if let Some(existing) = &content.marker {
                tracing::info!(
                    content_id = %content.id,
                    image_hash = %hash,
                    "Marker unchanged, reusing existing artifact"
                );
                return Ok(MarkerOutcome::Unchanged {
                    location: existing.clone(),
                });
            }
        }

        let (width, height) = validate_source_image(image_bytes)?;

        // Compile inside a scoped working area; cleaned up on every exit.
        let workdir = TempDir::new()?;
        let image_path = workdir.path().join("source.img");
        tokio::fs::write(&image_path, image_bytes).await?;

        let tracking_data = self
            .compiler
            .compile(&image_path, self.config.max_features)
            .await?;

        let artifact = MarkerArtifact::image(width, height, tracking_data);
        let payload = serde_json::to_vec(&artifact)?;
        let payload_size = payload.len() as u64;

        // Reserve before writing a single byte; released on any error below.
        let reservation = self
            .quota
            .reserve(content.tenant_id, payload_size)
            .map_err(|e| PipelineError::QuotaExceeded {
                requested: e.requested,
                available: e.available,
            })?;

        let filename = Self::artifact_filename(content.id);
        let (key, url) = self
            .storage
            .upload(content.tenant_id, &filename, "application/json", payload)
            .await?;

        reservation.commit();

        tracing::info!(
            content_id = %content.id,
            image_hash = %hash,
            key = %key,
            size_bytes = payload_size,
            "Marker artifact generated"
        );

        Ok(MarkerOutcome::Generated {
            location: StorageLocation::new(self.storage.backend_kind(), key, url),
            image_hash: hash,
            artifact,
            artifact_size: payload_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arlink_core::models::DurationYears;
    use arlink_core::BackendKind;
    use arlink_storage::LocalStorage;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct StubCompiler {
        calls: AtomicU32,
    }

    impl StubCompiler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl MarkerCompiler for StubCompiler {
        async fn compile(
            &self,
            _image_path: &Path,
            max_features: u32,
        ) -> Result<serde_json::Value, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"features": [], "max": max_features}))
        }
    }

    struct FailingCompiler;

    #[async_trait]
    impl MarkerCompiler for FailingCompiler {
        async fn compile(
            &self,
            _image_path: &Path,
            _max_features: u32,
        ) -> Result<serde_json::Value, PipelineError> {
            Err(PipelineError::CompilerFailure {
                diagnostics: "simulated crash".to_string(),
            })
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn test_content(tenant_id: Uuid) -> Content {
        Content::new(
            Uuid::new_v4(),
            tenant_id,
            "customer",
            DurationYears::One,
            StorageLocation::new(BackendKind::Local, "content/t/src.png", "http://u/src.png"),
        )
    }

    async fn local_storage(dir: &tempfile::TempDir) -> Arc<dyn Storage> {
        Arc::new(
            LocalStorage::new(dir.path(), "http://localhost:3000/content".to_string())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn generates_artifact_with_matching_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local_storage(&dir).await;
        let quota = QuotaTracker::new();
        let tenant_id = Uuid::new_v4();
        quota.set_limit(tenant_id, 1024 * 1024);

        let generator = MarkerGenerator::new(
            StubCompiler::new(),
            storage.clone(),
            quota.clone(),
            MarkerGeneratorConfig::default(),
        );

        let content = test_content(tenant_id);
        let outcome = generator.generate(&content, &png_bytes(8, 6)).await.unwrap();

        match outcome {
            MarkerOutcome::Generated {
                location,
                artifact,
                artifact_size,
                ..
            } => {
                assert_eq!(artifact.width, 8);
                assert_eq!(artifact.height, 6);
                assert!(storage.exists(&location.key).await.unwrap());
                assert_eq!(quota.consumed(tenant_id), artifact_size);
            }
            other => panic!("expected Generated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unchanged_image_reuses_artifact_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local_storage(&dir).await;
        let quota = QuotaTracker::new();
        let tenant_id = Uuid::new_v4();
        quota.set_limit(tenant_id, 1024 * 1024);

        let compiler = StubCompiler::new();
        let generator = MarkerGenerator::new(
            compiler.clone(),
            storage,
            quota.clone(),
            MarkerGeneratorConfig::default(),
        );

        let image = png_bytes(4, 4);
        let mut content = test_content(tenant_id);

        let first = generator.generate(&content, &image).await.unwrap();
        let (location, hash) = match first {
            MarkerOutcome::Generated {
                location,
                image_hash,
                ..
            } => (location, image_hash),
            other => panic!("expected Generated, got {:?}", other),
        };

        // Simulate the row update the job handler performs.
        content.marker = Some(location.clone());
        content.marker_image_hash = Some(hash);
        content.marker_status = ArtifactStatus::Ready;

        let consumed_before = quota.consumed(tenant_id);
        let second = generator.generate(&content, &image).await.unwrap();

        match second {
            MarkerOutcome::Unchanged { location: reused } => assert_eq!(reused, location),
            other => panic!("expected Unchanged, got {:?}", other),
        }
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(quota.consumed(tenant_id), consumed_before);
    }

    #[tokio::test]
    async fn invalid_image_is_rejected_before_compiling() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local_storage(&dir).await;
        let quota = QuotaTracker::new();
        let tenant_id = Uuid::new_v4();
        quota.set_limit(tenant_id, 1024 * 1024);

        let compiler = StubCompiler::new();
        let generator = MarkerGenerator::new(
            compiler.clone(),
            storage,
            quota,
            MarkerGeneratorConfig::default(),
        );

        let content = test_content(tenant_id);
        let err = generator.generate(&content, b"not an image").await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_rejection_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local_storage(&dir).await;
        let quota = QuotaTracker::new();
        let tenant_id = Uuid::new_v4();
        quota.set_limit(tenant_id, 4); // far too small for any artifact

        let generator = MarkerGenerator::new(
            StubCompiler::new(),
            storage,
            quota.clone(),
            MarkerGeneratorConfig::default(),
        );

        let content = test_content(tenant_id);
        let err = generator.generate(&content, &png_bytes(2, 2)).await.unwrap_err();

        assert!(matches!(err, PipelineError::QuotaExceeded { .. }));
        assert_eq!(quota.consumed(tenant_id), 0);
    }

    #[tokio::test]
    async fn compiler_failure_surfaces_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local_storage(&dir).await;
        let quota = QuotaTracker::new();
        let tenant_id = Uuid::new_v4();
        quota.set_limit(tenant_id, 1024 * 1024);

        let generator = MarkerGenerator::new(
            Arc::new(FailingCompiler),
            storage,
            quota.clone(),
            MarkerGeneratorConfig::default(),
        );

        let content = test_content(tenant_id);
        let err = generator.generate(&content, &png_bytes(2, 2)).await.unwrap_err();

        match err {
            PipelineError::CompilerFailure { diagnostics } => {
                assert!(diagnostics.contains("simulated crash"))
            }
            other => panic!("expected CompilerFailure, got {:?}", other),
        }
        assert_eq!(quota.consumed(tenant_id), 0);
    }
}
