use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::storage::StorageLocation;

/// Video attached to a content item.
///
/// `is_active` is derived state: the owning pointer is
/// `Content::active_video`, and only the lifecycle manager's atomic swap may
/// change either side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub content_id: Uuid,
    pub tenant_id: Uuid,
    pub storage: StorageLocation,
    pub file_size: u64,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail: Option<StorageLocation>,
    pub subscription_end: DateTime<Utc>,
    /// Position in the daily-rotation cycle.
    pub order_index: u32,
    /// For dated rotation: activate on or after this instant.
    pub activate_on: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl Video {
    pub fn new(
        content_id: Uuid,
        tenant_id: Uuid,
        storage: StorageLocation,
        file_size: u64,
        subscription_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id,
            tenant_id,
            storage,
            file_size,
            duration_secs: None,
            width: None,
            height: None,
            thumbnail: None,
            subscription_end,
            order_index: 0,
            activate_on: None,
            is_active: false,
            uploaded_at: Utc::now(),
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage.key
    }

    pub fn storage_url(&self) -> &str {
        &self.storage.url
    }
}
