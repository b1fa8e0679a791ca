//! Job handler context trait
//!
//! The application wires its state (store, generators, storage) into an
//! implementation of this trait. The queue holds a weak reference and calls
//! `run_job` when dispatching; the implementation matches on the job kind
//! and invokes the appropriate generator.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use arlink_core::models::Job;

/// Context for job dispatch.
///
/// The queue holds a `Weak` reference so it never keeps application state
/// alive past shutdown.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Execute one attempt of a job and return a result summary.
    ///
    /// Return a `JobError` (via anyhow) to control retry behavior; any other
    /// error is treated as recoverable.
    async fn run_job(self: Arc<Self>, job: &Job) -> Result<serde_json::Value>;

    /// Called exactly once when a job fails terminally, before the failure
    /// notification goes out. Sets the owning entity's status to `failed`.
    async fn on_terminal_failure(self: Arc<Self>, job: &Job, error: &str);
}

/// Placeholder context used when no real context exists yet (e.g. during
/// init). Dispatch always errors.
struct NoopContext;

#[async_trait]
impl JobHandlerContext for NoopContext {
    async fn run_job(self: Arc<Self>, _job: &Job) -> Result<serde_json::Value> {
        Err(anyhow!("NoopContext: no handler context available"))
    }

    async fn on_terminal_failure(self: Arc<Self>, _job: &Job, _error: &str) {}
}

/// Returns a weak reference to a no-op context. Use as placeholder when
/// building a JobQueue before the real application context exists.
pub fn empty_context_weak() -> Weak<dyn JobHandlerContext> {
    let n: Arc<dyn JobHandlerContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
