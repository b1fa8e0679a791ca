//! Arlink Lifecycle Library
//!
//! The application layer of the pipeline: the entity store, the content
//! lifecycle manager (ingest, activation, deletion), the rotation scheduler,
//! the viewer gate and the job handlers that tie the queue to the generators.

pub mod jobs;
pub mod manager;
pub mod pipeline;
pub mod rotation;
pub mod store;
pub mod viewer;

pub use jobs::PipelineContext;
pub use manager::{LifecycleManager, VideoUpload};
pub use pipeline::Pipeline;
pub use rotation::RotationScheduler;
pub use store::ContentStore;
pub use viewer::{ViewerGate, ViewOutcome};
