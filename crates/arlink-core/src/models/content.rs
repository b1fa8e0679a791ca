use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::storage::StorageLocation;

/// Status of an asynchronously produced artifact (marker or thumbnail).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Ready,
    Failed,
}

impl Display for ArtifactStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ArtifactStatus::Pending => write!(f, "pending"),
            ArtifactStatus::Ready => write!(f, "ready"),
            ArtifactStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Subscription length in years. Only 1, 3 and 5 are sold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DurationYears {
    One,
    Three,
    Five,
}

impl DurationYears {
    pub fn years(self) -> i64 {
        match self {
            DurationYears::One => 1,
            DurationYears::Three => 3,
            DurationYears::Five => 5,
        }
    }

    pub fn from_years(years: i64) -> Option<Self> {
        match years {
            1 => Some(DurationYears::One),
            3 => Some(DurationYears::Three),
            5 => Some(DurationYears::Five),
            _ => None,
        }
    }
}

/// How the active video rotates for a content item.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    #[default]
    None,
    /// Cycle through the ordered videos once per rotation period.
    Daily,
    /// Activate the video whose configured date has been reached.
    Dated,
}

/// Derived lifecycle state of a content item. Never persisted: expiry is
/// recomputed from `created_at` and the subscription length on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Pending,
    Ready,
    Expired,
}

/// AR content item: a source photo plus its derived marker/thumbnail
/// artifacts and the set of attached videos.
///
/// `active_video` is the owning side of the active relationship; the
/// `is_active` flag on the video rows is derived and kept in agreement only
/// through the lifecycle manager's atomic swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub project_id: Uuid,
    pub tenant_id: Uuid,
    /// Process-wide unique identifier used in the public viewer link.
    pub public_id: String,
    pub customer_name: String,
    pub notes: Option<String>,
    pub duration: DurationYears,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Where the uploaded source photo lives.
    pub source_image: StorageLocation,
    /// SHA-256 of the source image bytes the current marker was built from.
    pub marker_image_hash: Option<String>,
    pub marker: Option<StorageLocation>,
    pub marker_status: ArtifactStatus,
    pub thumbnail: Option<StorageLocation>,
    pub thumbnail_status: ArtifactStatus,
    pub active_video: Option<Uuid>,
    pub rotation: RotationKind,
}

impl Content {
    pub fn new(
        project_id: Uuid,
        tenant_id: Uuid,
        customer_name: impl Into<String>,
        duration: DurationYears,
        source_image: StorageLocation,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            tenant_id,
            public_id: Uuid::new_v4().simple().to_string(),
            customer_name: customer_name.into(),
            notes: None,
            duration,
            created_at: now,
            updated_at: now,
            source_image,
            marker_image_hash: None,
            marker: None,
            marker_status: ArtifactStatus::Pending,
            thumbnail: None,
            thumbnail_status: ArtifactStatus::Pending,
            active_video: None,
            rotation: RotationKind::None,
        }
    }

    /// When the subscription window closes: `created_at + years * 365d`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(365 * self.duration.years())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Lifecycle state at `now`. Expiry wins over artifact readiness so a
    /// stale sweep can never resurrect an expired item.
    pub fn state(&self, now: DateTime<Utc>) -> ContentState {
        if self.is_expired(now) {
            ContentState::Expired
        } else if self.marker_status == ArtifactStatus::Ready
            && self.thumbnail_status == ArtifactStatus::Ready
        {
            ContentState::Ready
        } else {
            ContentState::Pending
        }
    }
}
