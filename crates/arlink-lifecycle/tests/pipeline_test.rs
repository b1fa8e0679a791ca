//! End-to-end pipeline tests: ingest through job execution to the viewer
//! gate, with stubbed compiler/scaler binaries.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use arlink_core::models::{ArtifactStatus, ContentState, DurationYears, JobKind};
use arlink_core::{Config, PipelineError, RotationConfig, StorageConfig, WorkerConfig};
use arlink_infra::Notifier;
use arlink_lifecycle::{Pipeline, VideoUpload, ViewOutcome};
use arlink_processing::{MarkerCompiler, MediaScaler};
use arlink_storage::{LocalStorage, Storage};

struct StubCompiler;

#[async_trait]
impl MarkerCompiler for StubCompiler {
    async fn compile(
        &self,
        _image_path: &Path,
        _max_features: u32,
    ) -> Result<serde_json::Value, PipelineError> {
        Ok(serde_json::json!({ "features": [[1, 2], [3, 4]] }))
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
            diagnostics: "tracker crashed".to_string(),
        })
    }
}

struct StubScaler;

#[async_trait]
impl MediaScaler for StubScaler {
    async fn scale(
        &self,
        _input: &Path,
        output: &Path,
        _width: u32,
        _height: u32,
    ) -> Result<(), PipelineError> {
        tokio::fs::write(output, b"jpeg-bytes")
            .await
            .map_err(PipelineError::from)
    }
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicU32,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _content_id: Uuid, _kind: JobKind, _error_summary: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config(max_retries: u32) -> Config {
    Config {
        storage: StorageConfig {
            backend: arlink_core::BackendKind::Local,
            local_storage_path: None,
            local_storage_base_url: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            cloud_disk_api_base: None,
            cloud_disk_token: None,
        },
        worker: WorkerConfig {
            max_workers: 2,
            max_retries,
            job_timeout_secs: 10,
        },
        rotation: RotationConfig {
            period_secs: 86_400,
            tick_secs: 300,
        },
        marker_compiler_path: "unused".to_string(),
        marker_max_features: 500,
        compile_timeout_secs: 10,
        scaler_path: "unused".to_string(),
        scale_timeout_secs: 10,
        thumbnail_width: 320,
        thumbnail_height: 180,
        notify_webhook_url: None,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

async fn pipeline_with(
    dir: &tempfile::TempDir,
    compiler: Arc<dyn MarkerCompiler>,
    notifier: Arc<dyn Notifier>,
    max_retries: u32,
) -> Pipeline {
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(dir.path(), "http://localhost:3000/content".to_string())
            .await
            .unwrap(),
    );
    Pipeline::assemble(
        &test_config(max_retries),
        storage,
        compiler,
        Arc::new(StubScaler),
        notifier,
    )
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn ingest_produces_ready_viewable_content() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        &dir,
        Arc::new(StubCompiler),
        Arc::new(CountingNotifier::default()),
        3,
    )
    .await;

    let tenant = arlink_core::models::Tenant::new(
        "acme",
        arlink_core::BackendKind::Local,
        10 * 1024 * 1024,
    );
    pipeline.manager().register_tenant(tenant.clone()).await;
    let project = pipeline
        .manager()
        .create_project(tenant.id, "launch")
        .await
        .unwrap();

    let content = pipeline
        .ingest(
            project.id,
            "customer",
            DurationYears::One,
            png_bytes(16, 16),
            "image/png",
        )
        .await
        .unwrap();

    let store = pipeline.store().clone();
    let content_id = content.id;
    wait_for(|| {
        let store = store.clone();
        async move {
            store
                .content(content_id)
                .await
                .is_some_and(|c| c.state(chrono::Utc::now()) == ContentState::Ready)
        }
    })
    .await;

    let row = pipeline.store().content(content.id).await.unwrap();
    assert_eq!(row.marker_status, ArtifactStatus::Ready);
    assert!(row.marker.is_some());
    assert!(row.marker_image_hash.is_some());
    assert!(row.thumbnail.is_some());

    // Both artifacts really exist and count against the quota.
    assert!(pipeline.quota().consumed(tenant.id) > png_bytes(16, 16).len() as u64);

    match pipeline.gate().resolve(&content.public_id).await {
        ViewOutcome::View {
            content: viewed,
            active_video,
            marker_url,
            thumbnail_url,
        } => {
            assert_eq!(viewed.id, content.id);
            assert!(active_video.is_none());
            assert!(marker_url.is_some());
            assert!(thumbnail_url.is_some());
        }
        other => panic!("expected viewable content, got {:?}", other),
    }

    pipeline.shutdown().await;
}

#[tokio::test]
async fn activation_switch_is_visible_through_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        &dir,
        Arc::new(StubCompiler),
        Arc::new(CountingNotifier::default()),
        3,
    )
    .await;

    let tenant = arlink_core::models::Tenant::new(
        "acme",
        arlink_core::BackendKind::Local,
        10 * 1024 * 1024,
    );
    pipeline.manager().register_tenant(tenant.clone()).await;
    let project = pipeline
        .manager()
        .create_project(tenant.id, "launch")
        .await
        .unwrap();
    let content = pipeline
        .ingest(
            project.id,
            "customer",
            DurationYears::Three,
            png_bytes(8, 8),
            "image/png",
        )
        .await
        .unwrap();

    let video_a = pipeline
        .manager()
        .add_video(content.id, vec![1u8; 64], VideoUpload::default())
        .await
        .unwrap();
    let video_b = pipeline
        .manager()
        .add_video(content.id, vec![2u8; 64], VideoUpload::default())
        .await
        .unwrap();

    pipeline.manager().activate(content.id, video_a.id).await.unwrap();
    pipeline.manager().activate(content.id, video_b.id).await.unwrap();

    match pipeline.gate().resolve(&content.public_id).await {
        ViewOutcome::View {
            active_video: Some(active),
            ..
        } => assert_eq!(active.id, video_b.id),
        other => panic!("expected active video B, got {:?}", other),
    }

    pipeline.shutdown().await;
}

#[tokio::test]
async fn terminal_marker_failure_marks_row_and_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(CountingNotifier::default());
    // No retries: the first failed attempt is terminal.
    let pipeline = pipeline_with(&dir, Arc::new(FailingCompiler), notifier.clone(), 0).await;

    let tenant = arlink_core::models::Tenant::new(
        "acme",
        arlink_core::BackendKind::Local,
        10 * 1024 * 1024,
    );
    pipeline.manager().register_tenant(tenant.clone()).await;
    let project = pipeline
        .manager()
        .create_project(tenant.id, "launch")
        .await
        .unwrap();
    let content = pipeline
        .ingest(
            project.id,
            "customer",
            DurationYears::One,
            png_bytes(8, 8),
            "image/png",
        )
        .await
        .unwrap();

    let store = pipeline.store().clone();
    let content_id = content.id;
    wait_for(|| {
        let store = store.clone();
        async move {
            store
                .content(content_id)
                .await
                .is_some_and(|c| c.marker_status == ArtifactStatus::Failed)
        }
    })
    .await;

    // Exactly one notification for the marker job. The thumbnail job is
    // unaffected by the compiler and may still succeed.
    wait_for(|| {
        let notifier = notifier.clone();
        async move { notifier.calls.load(Ordering::SeqCst) == 1 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);

    // A failed marker keeps the content out of the ready state.
    let row = pipeline.store().content(content.id).await.unwrap();
    assert_eq!(row.state(chrono::Utc::now()), ContentState::Pending);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn deleting_content_mid_pipeline_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        &dir,
        Arc::new(StubCompiler),
        Arc::new(CountingNotifier::default()),
        3,
    )
    .await;

    let tenant = arlink_core::models::Tenant::new(
        "acme",
        arlink_core::BackendKind::Local,
        10 * 1024 * 1024,
    );
    pipeline.manager().register_tenant(tenant.clone()).await;
    let project = pipeline
        .manager()
        .create_project(tenant.id, "launch")
        .await
        .unwrap();
    let content = pipeline
        .ingest(
            project.id,
            "customer",
            DurationYears::One,
            png_bytes(8, 8),
            "image/png",
        )
        .await
        .unwrap();

    // Wait for processing to settle, then delete everything.
    let store = pipeline.store().clone();
    let content_id = content.id;
    wait_for(|| {
        let store = store.clone();
        async move {
            store
                .content(content_id)
                .await
                .is_some_and(|c| c.marker_status == ArtifactStatus::Ready
                    && c.thumbnail_status == ArtifactStatus::Ready)
        }
    })
    .await;

    pipeline.manager().delete_content(content.id).await.unwrap();

    assert_eq!(pipeline.quota().consumed(tenant.id), 0);
    assert!(matches!(
        pipeline.gate().resolve(&content.public_id).await,
        ViewOutcome::NotFound
    ));

    pipeline.shutdown().await;
}
