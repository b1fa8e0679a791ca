//! Job queue: per-kind queues, in-flight de-duplication, worker pool and
//! retry with exponential backoff.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the dispatch loops to stop; it
//! does not wait for in-flight jobs. For graceful shutdown, coordinate with
//! your runtime and allow time for running jobs to finish before exit.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use uuid::Uuid;

use arlink_core::models::{Job, JobKind};
use arlink_core::JobError;
use arlink_infra::Notifier;

use crate::context::JobHandlerContext;

/// Maximum delay in seconds before retrying a failed job. Caps exponential
/// backoff so that high attempt counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given attempt (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempt: u32) -> u64 {
    2_u64.saturating_pow(attempt).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub job_timeout_secs: u64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_retries: 3,
            job_timeout_secs: 600,
        }
    }
}

impl From<arlink_core::WorkerConfig> for JobQueueConfig {
    fn from(config: arlink_core::WorkerConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            max_retries: config.max_retries,
            job_timeout_secs: config.job_timeout_secs,
        }
    }
}

type InflightMap = Arc<Mutex<HashMap<(Uuid, JobKind), Job>>>;

/// Shared dispatch state handed to every spawned attempt.
struct Dispatcher {
    inflight: InflightMap,
    senders: HashMap<JobKind, mpsc::UnboundedSender<Job>>,
    context: Weak<dyn JobHandlerContext>,
    notifier: Arc<dyn Notifier>,
    config: JobQueueConfig,
}

pub struct JobQueue {
    inflight: InflightMap,
    senders: HashMap<JobKind, mpsc::UnboundedSender<Job>>,
    shutdown_txs: Vec<mpsc::Sender<()>>,
}

impl JobQueue {
    /// Create a queue and start one dispatch loop per job kind, sharing a
    /// worker pool of `max_workers` permits.
    pub fn new(
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let inflight: InflightMap = Arc::new(Mutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(config.max_workers));

        let mut senders = HashMap::new();
        let mut receivers = Vec::new();
        for kind in JobKind::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(kind, tx);
            receivers.push((kind, rx));
        }

        let dispatcher = Arc::new(Dispatcher {
            inflight: inflight.clone(),
            senders: senders.clone(),
            context,
            notifier,
            config: config.clone(),
        });

        let mut shutdown_txs = Vec::new();
        for (kind, rx) in receivers {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            shutdown_txs.push(shutdown_tx);
            tokio::spawn(Self::dispatch_loop(
                kind,
                rx,
                shutdown_rx,
                semaphore.clone(),
                dispatcher.clone(),
            ));
        }

        tracing::info!(
            max_workers = config.max_workers,
            max_retries = config.max_retries,
            "Job queue started"
        );

        Self {
            inflight,
            senders,
            shutdown_txs,
        }
    }

    /// Submit a job. At-least-once, fire-and-forget: returns `true` when a
    /// new job was enqueued and `false` when an in-flight job for the same
    /// `(content_id, kind)` pair absorbed the request.
    pub async fn enqueue(&self, content_id: Uuid, kind: JobKind) -> Result<bool> {
        let mut inflight = self.inflight.lock().await;
        if inflight.contains_key(&(content_id, kind)) {
            tracing::debug!(
                content_id = %content_id,
                job_kind = %kind,
                "Duplicate enqueue coalesced into in-flight job"
            );
            return Ok(false);
        }

        let job = Job::new(content_id, kind);
        inflight.insert(job.key(), job.clone());
        drop(inflight);

        let sender = self
            .senders
            .get(&kind)
            .ok_or_else(|| anyhow::anyhow!("No queue for job kind {}", kind))?;
        if sender.send(job).is_err() {
            // Dispatch loop has shut down; drop the record so a later
            // enqueue against a restarted queue is not blocked.
            self.inflight.lock().await.remove(&(content_id, kind));
            anyhow::bail!("Job queue for {} has shut down", kind);
        }

        tracing::info!(
            content_id = %content_id,
            job_kind = %kind,
            "Job submitted to queue"
        );

        Ok(true)
    }

    /// Snapshot of the in-flight job record for a pair, if any.
    pub async fn inflight_job(&self, content_id: Uuid, kind: JobKind) -> Option<Job> {
        self.inflight.lock().await.get(&(content_id, kind)).cloned()
    }

    async fn dispatch_loop(
        kind: JobKind,
        mut rx: mpsc::UnboundedReceiver<Job>,
        mut shutdown_rx: mpsc::Receiver<()>,
        semaphore: Arc<Semaphore>,
        dispatcher: Arc<Dispatcher>,
    ) {
        tracing::info!(job_kind = %kind, "Dispatch loop started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(job_kind = %kind, "Dispatch loop shutting down");
                    break;
                }
                job = rx.recv() => {
                    let Some(job) = job else { break };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        dispatcher.process_attempt(job).await;
                    });
                }
            }
        }
    }

    /// Signals the dispatch loops to stop claiming new jobs.
    ///
    /// Returns immediately; already-spawned attempts continue running until
    /// they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        for tx in &self.shutdown_txs {
            let _ = tx.send(()).await;
        }
    }
}

impl Dispatcher {
    /// Run one attempt of a job and settle the outcome: success, scheduled
    /// retry, or terminal failure (status update + one notification).
    async fn process_attempt(self: Arc<Self>, job: Job) {
        let Some(ctx) = self.context.upgrade() else {
            tracing::error!(
                content_id = %job.content_id,
                job_kind = %job.kind,
                "Handler context dropped, abandoning job"
            );
            self.inflight.lock().await.remove(&job.key());
            return;
        };

        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        let result = tokio::time::timeout(timeout, ctx.clone().run_job(&job)).await;

        match result {
            Ok(Ok(summary)) => {
                self.inflight.lock().await.remove(&job.key());
                tracing::info!(
                    content_id = %job.content_id,
                    job_kind = %job.kind,
                    attempt = job.attempt,
                    result = %summary,
                    "Job completed successfully"
                );
            }
            Ok(Err(e)) => {
                let is_unrecoverable = e
                    .downcast_ref::<JobError>()
                    .map(|je| !je.is_recoverable())
                    .unwrap_or(false);

                tracing::error!(
                    content_id = %job.content_id,
                    job_kind = %job.kind,
                    attempt = job.attempt,
                    error = %e,
                    unrecoverable = is_unrecoverable,
                    "Job attempt failed"
                );

                if is_unrecoverable || job.attempt >= self.config.max_retries {
                    self.settle_terminal_failure(ctx, job, &e.to_string()).await;
                } else {
                    self.schedule_retry(job, e.to_string()).await;
                }
            }
            Err(_) => {
                tracing::error!(
                    content_id = %job.content_id,
                    job_kind = %job.kind,
                    attempt = job.attempt,
                    timeout_secs = self.config.job_timeout_secs,
                    "Job attempt timed out"
                );

                if job.attempt >= self.config.max_retries {
                    self.settle_terminal_failure(ctx, job, "Job execution timed out")
                        .await;
                } else {
                    self.schedule_retry(job, "Job execution timed out".to_string())
                        .await;
                }
            }
        }
    }

    /// Re-enqueue after backoff. The in-flight record stays, so duplicate
    /// enqueues keep coalescing while the retry is pending.
    async fn schedule_retry(&self, mut job: Job, error: String) {
        let backoff_secs = compute_retry_backoff_seconds(job.attempt);
        job.attempt += 1;
        job.last_error = Some(error);

        if let Some(record) = self.inflight.lock().await.get_mut(&job.key()) {
            record.attempt = job.attempt;
            record.last_error = job.last_error.clone();
        }

        tracing::info!(
            content_id = %job.content_id,
            job_kind = %job.kind,
            attempt = job.attempt,
            backoff_seconds = backoff_secs,
            "Scheduling job retry"
        );

        let sender = self.senders.get(&job.kind).cloned();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            if let Some(sender) = sender {
                let _ = sender.send(job);
            }
        });
    }

    /// Remove the job record, mark the owning entity failed and emit the one
    /// externally visible side effect of exhaustion: a notification.
    async fn settle_terminal_failure(
        &self,
        ctx: Arc<dyn JobHandlerContext>,
        job: Job,
        error: &str,
    ) {
        self.inflight.lock().await.remove(&job.key());
        ctx.on_terminal_failure(&job, error).await;
        self.notifier.notify(job.content_id, job.kind, error).await;
        tracing::error!(
            content_id = %job.content_id,
            job_kind = %job.kind,
            attempt = job.attempt,
            "Job failed terminally"
        );
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
            senders: self.senders.clone(),
            shutdown_txs: self.shutdown_txs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(10), MAX_RETRY_BACKOFF_SECS);
    }

    /// Context that fails the first `fail_first` attempts, then succeeds.
    struct CountingContext {
        runs: AtomicU32,
        terminal_failures: AtomicU32,
        fail_first: u32,
        unrecoverable: bool,
    }

    impl CountingContext {
        fn new(fail_first: u32, unrecoverable: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                terminal_failures: AtomicU32::new(0),
                fail_first,
                unrecoverable,
            })
        }
    }

    #[async_trait]
    impl JobHandlerContext for CountingContext {
        async fn run_job(self: Arc<Self>, _job: &Job) -> Result<serde_json::Value> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.fail_first {
                if self.unrecoverable {
                    return Err(JobError::unrecoverable(anyhow::anyhow!("bad input")).into());
                }
                return Err(anyhow::anyhow!("transient failure"));
            }
            Ok(serde_json::json!({"ok": true}))
        }

        async fn on_terminal_failure(self: Arc<Self>, _job: &Job, _error: &str) {
            self.terminal_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingNotifier {
        notifications: AtomicU32,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _content_id: Uuid, _kind: JobKind, _error: &str) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_notifier() -> Arc<CountingNotifier> {
        Arc::new(CountingNotifier {
            notifications: AtomicU32::new(0),
        })
    }

    async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Duration::from_millis(deadline_ms);
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    #[tokio::test]
    async fn successful_job_runs_once_and_clears_record() {
        let ctx = CountingContext::new(0, false);
        let ctx_dyn: Arc<dyn JobHandlerContext> = ctx.clone();
        let queue = JobQueue::new(
            JobQueueConfig::default(),
            Arc::downgrade(&ctx_dyn),
            counting_notifier(),
        );

        let content_id = Uuid::new_v4();
        assert!(queue.enqueue(content_id, JobKind::Marker).await.unwrap());

        assert!(
            wait_until(2_000, || ctx.runs.load(Ordering::SeqCst) == 1).await,
            "job never ran"
        );

        let mut cleared = false;
        for _ in 0..100 {
            if queue
                .inflight_job(content_id, JobKind::Marker)
                .await
                .is_none()
            {
                cleared = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cleared, "in-flight record not cleared after success");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_enqueue_is_coalesced() {
        // Context that blocks long enough for the duplicate to arrive.
        struct SlowContext {
            runs: AtomicU32,
        }

        #[async_trait]
        impl JobHandlerContext for SlowContext {
            async fn run_job(self: Arc<Self>, _job: &Job) -> Result<serde_json::Value> {
                self.runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(serde_json::json!({}))
            }
            async fn on_terminal_failure(self: Arc<Self>, _job: &Job, _error: &str) {}
        }

        let ctx = Arc::new(SlowContext {
            runs: AtomicU32::new(0),
        });
        let ctx_dyn: Arc<dyn JobHandlerContext> = ctx.clone();
        let queue = JobQueue::new(
            JobQueueConfig::default(),
            Arc::downgrade(&ctx_dyn),
            counting_notifier(),
        );

        let content_id = Uuid::new_v4();
        assert!(queue.enqueue(content_id, JobKind::Thumbnail).await.unwrap());
        assert!(!queue.enqueue(content_id, JobKind::Thumbnail).await.unwrap());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(ctx.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_to_success() {
        let ctx = CountingContext::new(1, false);
        let ctx_dyn: Arc<dyn JobHandlerContext> = ctx.clone();
        let notifier = counting_notifier();
        let queue = JobQueue::new(
            JobQueueConfig {
                max_workers: 2,
                max_retries: 2,
                job_timeout_secs: 5,
            },
            Arc::downgrade(&ctx_dyn),
            notifier.clone(),
        );

        queue.enqueue(Uuid::new_v4(), JobKind::Marker).await.unwrap();

        // First attempt fails, backoff is 1s, second succeeds.
        assert!(
            wait_until(5_000, || ctx.runs.load(Ordering::SeqCst) == 2).await,
            "retry never happened"
        );
        assert_eq!(ctx.terminal_failures.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.notifications.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_notifies_exactly_once() {
        let ctx = CountingContext::new(u32::MAX, false);
        let ctx_dyn: Arc<dyn JobHandlerContext> = ctx.clone();
        let notifier = counting_notifier();
        let queue = JobQueue::new(
            JobQueueConfig {
                max_workers: 2,
                max_retries: 0,
                job_timeout_secs: 5,
            },
            Arc::downgrade(&ctx_dyn),
            notifier.clone(),
        );

        let content_id = Uuid::new_v4();
        queue.enqueue(content_id, JobKind::Marker).await.unwrap();

        assert!(
            wait_until(2_000, || {
                notifier.notifications.load(Ordering::SeqCst) == 1
            })
            .await,
            "no terminal notification"
        );
        assert_eq!(ctx.terminal_failures.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.runs.load(Ordering::SeqCst), 1);

        // Record is gone, so a fresh enqueue is accepted again.
        assert!(queue.enqueue(content_id, JobKind::Marker).await.unwrap());
    }

    #[tokio::test]
    async fn unrecoverable_failure_skips_retries() {
        let ctx = CountingContext::new(u32::MAX, true);
        let ctx_dyn: Arc<dyn JobHandlerContext> = ctx.clone();
        let notifier = counting_notifier();
        let queue = JobQueue::new(
            JobQueueConfig {
                max_workers: 2,
                max_retries: 5,
                job_timeout_secs: 5,
            },
            Arc::downgrade(&ctx_dyn),
            notifier.clone(),
        );

        queue.enqueue(Uuid::new_v4(), JobKind::Thumbnail).await.unwrap();

        assert!(
            wait_until(2_000, || {
                notifier.notifications.load(Ordering::SeqCst) == 1
            })
            .await
        );
        assert_eq!(ctx.runs.load(Ordering::SeqCst), 1);
    }
}
