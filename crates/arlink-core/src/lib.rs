//! Arlink Core Library
//!
//! This crate provides core domain models, error types, configuration, and the
//! per-tenant quota tracker that are shared across all Arlink components.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;
pub mod quota;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, RotationConfig, StorageConfig, WorkerConfig};
pub use error::PipelineError;
pub use job_error::{JobError, JobResultExt};
pub use quota::{QuotaExceeded, QuotaTracker, Reservation};
pub use storage_types::BackendKind;
