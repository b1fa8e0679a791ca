pub mod content;
pub mod job;
pub mod marker;
pub mod project;
pub mod storage;
pub mod tenant;
pub mod video;

pub use content::{ArtifactStatus, Content, ContentState, DurationYears, RotationKind};
pub use job::{Job, JobKind};
pub use marker::{MarkerArtifact, MARKER_FORMAT_VERSION};
pub use project::Project;
pub use storage::StorageLocation;
pub use tenant::{Tenant, TenantStatus};
pub use video::Video;
