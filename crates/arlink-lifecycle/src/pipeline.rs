//! Top-level pipeline assembly.
//!
//! Wires storage, quota, generators, the job queue, the rotation scheduler
//! and the viewer gate together from configuration. The queue only holds a
//! weak reference to the job context, so dropping the pipeline tears the
//! whole thing down.

use std::sync::{Arc, Weak};
use std::time::Duration;

use uuid::Uuid;

use arlink_core::models::{Content, DurationYears, JobKind};
use arlink_core::{Config, PipelineError, QuotaTracker};
use arlink_infra::{LogNotifier, Notifier, WebhookNotifier, WebhookNotifierConfig};
use arlink_processing::{
    CliMarkerCompiler, CliMediaScaler, MarkerCompiler, MarkerGenerator, MarkerGeneratorConfig,
    MediaScaler, ThumbnailGenerator, ThumbnailGeneratorConfig,
};
use arlink_storage::{create_storage, Storage};
use arlink_worker::{JobHandlerContext, JobQueue};

use crate::jobs::PipelineContext;
use crate::manager::LifecycleManager;
use crate::rotation::RotationScheduler;
use crate::store::ContentStore;
use crate::viewer::ViewerGate;

pub struct Pipeline {
    store: ContentStore,
    quota: QuotaTracker,
    manager: Arc<LifecycleManager>,
    gate: ViewerGate,
    scheduler: Arc<RotationScheduler>,
    queue: JobQueue,
    // Keeps the job context alive; the queue only holds a Weak.
    _context: Arc<PipelineContext>,
}

impl Pipeline {
    /// Build the pipeline from configuration, using the configured external
    /// compiler and scaler binaries.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let storage = create_storage(&config.storage).await?;
        let compiler: Arc<dyn MarkerCompiler> = Arc::new(CliMarkerCompiler::new(
            config.marker_compiler_path.clone(),
            Duration::from_secs(config.compile_timeout_secs),
        ));
        let scaler: Arc<dyn MediaScaler> = Arc::new(CliMediaScaler::new(
            config.scaler_path.clone(),
            Duration::from_secs(config.scale_timeout_secs),
        ));
        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(WebhookNotifierConfig::new(url.clone()))),
            None => Arc::new(LogNotifier),
        };
        Ok(Self::assemble(config, storage, compiler, scaler, notifier))
    }

    /// Build the pipeline from explicit components, letting callers and
    /// tests inject stub compilers, scalers and notifiers.
    pub fn assemble(
        config: &Config,
        storage: Arc<dyn Storage>,
        compiler: Arc<dyn MarkerCompiler>,
        scaler: Arc<dyn MediaScaler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = ContentStore::new();
        let quota = QuotaTracker::new();

        let marker = MarkerGenerator::new(
            compiler,
            storage.clone(),
            quota.clone(),
            MarkerGeneratorConfig {
                max_features: config.marker_max_features,
            },
        );
        let thumbnail = ThumbnailGenerator::new(
            scaler,
            storage.clone(),
            quota.clone(),
            ThumbnailGeneratorConfig {
                width: config.thumbnail_width,
                height: config.thumbnail_height,
            },
        );

        let context = PipelineContext::new(
            store.clone(),
            storage.clone(),
            quota.clone(),
            marker,
            thumbnail,
        );
        let context_dyn: Arc<dyn JobHandlerContext> = context.clone();
        let weak: Weak<dyn JobHandlerContext> = Arc::downgrade(&context_dyn);
        let queue = JobQueue::new(config.worker.clone().into(), weak, notifier);

        let manager = Arc::new(LifecycleManager::new(
            store.clone(),
            storage,
            quota.clone(),
        ));
        let gate = ViewerGate::new(store.clone());
        let scheduler = Arc::new(RotationScheduler::new(
            store.clone(),
            manager.clone(),
            config.rotation.clone(),
        ));

        Self {
            store,
            quota,
            manager,
            gate,
            scheduler,
            queue,
            _context: context,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    pub fn gate(&self) -> &ViewerGate {
        &self.gate
    }

    pub fn scheduler(&self) -> &Arc<RotationScheduler> {
        &self.scheduler
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Ingest a photo and kick off marker and thumbnail generation.
    pub async fn ingest(
        &self,
        project_id: Uuid,
        customer_name: impl Into<String>,
        duration: DurationYears,
        photo: Vec<u8>,
        content_type: &str,
    ) -> Result<Content, PipelineError> {
        let content = self
            .manager
            .create_content(project_id, customer_name, duration, photo, content_type)
            .await?;
        for kind in JobKind::ALL {
            self.queue
                .enqueue(content.id, kind)
                .await
                .map_err(|e| PipelineError::InternalWithSource {
                    message: format!("enqueue {} job", kind),
                    source: e,
                })?;
        }
        Ok(content)
    }

    /// Stop the scheduler and drain queue workers.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.queue.shutdown().await;
    }
}
