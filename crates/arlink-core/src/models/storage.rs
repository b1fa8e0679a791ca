//! Storage location model: backend-agnostic reference to a stored artifact.

use serde::{Deserialize, Serialize};

use crate::storage_types::BackendKind;

/// A reference to an artifact's physical location (local disk, S3, cloud disk).
///
/// Ownership is exclusive: a location belongs to exactly one content or video
/// row and is never shared between two rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub backend: BackendKind,
    pub key: String,
    pub url: String,
}

impl StorageLocation {
    pub fn new(backend: BackendKind, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            url: url.into(),
        }
    }
}
