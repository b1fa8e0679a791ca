//! Viewer gate: decides whether a public content link may be served.
//!
//! Expiry is recomputed on every resolution from `created_at` and the
//! subscription length; there is no persisted expired flag to go stale.

use chrono::{DateTime, Utc};

use arlink_core::models::{Content, ContentState, Video};

use crate::store::ContentStore;

/// What a viewer link resolves to.
#[derive(Debug)]
pub enum ViewOutcome {
    /// Servable content, with whichever video is currently active. The
    /// artifact URLs are `None` while generation is still pending.
    View {
        content: Content,
        active_video: Option<Video>,
        marker_url: Option<String>,
        thumbnail_url: Option<String>,
    },
    /// The subscription window has closed. Distinct from `NotFound` so the
    /// caller can render an "expired" page instead of a 404.
    Expired,
    NotFound,
}

#[derive(Clone)]
pub struct ViewerGate {
    store: ContentStore,
}

impl ViewerGate {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, public_id: &str) -> ViewOutcome {
        self.resolve_at(public_id, Utc::now()).await
    }

    /// Resolve a public id at an explicit instant.
    pub async fn resolve_at(&self, public_id: &str, now: DateTime<Utc>) -> ViewOutcome {
        let Some(content) = self.store.content_by_public_id(public_id).await else {
            return ViewOutcome::NotFound;
        };

        if content.state(now) == ContentState::Expired {
            tracing::debug!(
                public_id = %public_id,
                content_id = %content.id,
                "Viewer request for expired content"
            );
            return ViewOutcome::Expired;
        }

        let active_video = match content.active_video {
            Some(video_id) => self.store.video(video_id).await,
            None => None,
        };
        let marker_url = content.marker.as_ref().map(|l| l.url.clone());
        let thumbnail_url = content.thumbnail.as_ref().map(|l| l.url.clone());
        ViewOutcome::View {
            content,
            active_video,
            marker_url,
            thumbnail_url,
        }
    }
}
