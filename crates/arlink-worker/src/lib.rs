//! Arlink Worker Library
//!
//! Queue-backed, retrying execution layer for marker and thumbnail jobs.

pub mod context;
pub mod queue;

pub use context::{empty_context_weak, JobHandlerContext};
pub use queue::{JobQueue, JobQueueConfig, MAX_RETRY_BACKOFF_SECS};
