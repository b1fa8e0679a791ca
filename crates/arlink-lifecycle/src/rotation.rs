//! Background rotation scheduler.
//!
//! Periodically advances the active video of rotating content items. A
//! rotation period is a fixed-length UTC window counted from the UNIX epoch,
//! so boundaries never move with daylight-saving transitions and a restart
//! inside a window does not rotate a second time (daily rotation remembers
//! the last window it acted in; dated rotation is naturally idempotent).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use arlink_core::models::{Content, RotationKind, Video};
use arlink_core::RotationConfig;

use crate::manager::LifecycleManager;
use crate::store::ContentStore;

pub struct RotationScheduler {
    store: ContentStore,
    manager: Arc<LifecycleManager>,
    config: RotationConfig,
    /// content id -> last rotation window index acted upon (daily rotation).
    last_periods: Mutex<HashMap<Uuid, i64>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RotationScheduler {
    pub fn new(store: ContentStore, manager: Arc<LifecycleManager>, config: RotationConfig) -> Self {
        Self {
            store,
            manager,
            config,
            last_periods: Mutex::new(HashMap::new()),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Start the background sweep loop.
    pub async fn start(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let scheduler = self.clone();
        let tick = Duration::from_secs(self.config.tick_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scheduler.run_once(Utc::now()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Rotation scheduler stopped");
                        break;
                    }
                }
            }
        });
        tracing::info!(
            period_secs = self.config.period_secs,
            tick_secs = self.config.tick_secs,
            "Rotation scheduler started"
        );
    }

    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }

    /// One sweep over all rotating content at `now`. Public so callers (and
    /// tests) can drive the cadence themselves.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        let period = self.current_period(now);
        let contents = self.store.rotating_contents().await;

        // Window bookkeeping for content that no longer rotates is dropped
        // here, so the map tracks live rotating items only.
        {
            let live: HashSet<Uuid> = contents.iter().map(|c| c.id).collect();
            self.last_periods.lock().await.retain(|id, _| live.contains(id));
        }

        for content in contents {
            if content.is_expired(now) {
                continue;
            }
            match content.rotation {
                RotationKind::Daily => self.rotate_daily(&content, period).await,
                RotationKind::Dated => self.rotate_dated(&content, now).await,
                RotationKind::None => {}
            }
        }
    }

    fn current_period(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.config.period_secs.max(1) as i64)
    }

    /// Advance to the next video in order, at most once per window.
    async fn rotate_daily(&self, content: &Content, period: i64) {
        {
            let last = self.last_periods.lock().await;
            if last.get(&content.id) == Some(&period) {
                return;
            }
        }

        let videos = self.store.videos_for_content(content.id).await;
        if videos.is_empty() {
            return;
        }
        let next = next_in_cycle(&videos, content.active_video);

        match self.manager.activate(content.id, next).await {
            Ok(()) => {
                self.last_periods.lock().await.insert(content.id, period);
                tracing::info!(
                    content_id = %content.id,
                    video_id = %next,
                    period,
                    "Rotated active video"
                );
            }
            Err(e) => tracing::warn!(
                content_id = %content.id,
                error = %e,
                "Daily rotation failed; will retry next tick"
            ),
        }
    }

    /// Activate the video with the latest reached `activate_on`.
    async fn rotate_dated(&self, content: &Content, now: DateTime<Utc>) {
        let videos = self.store.videos_for_content(content.id).await;
        let due = videos
            .iter()
            .filter(|v| v.activate_on.is_some_and(|at| at <= now))
            .max_by_key(|v| v.activate_on);

        let Some(video) = due else { return };
        if content.active_video == Some(video.id) {
            return;
        }
        if let Err(e) = self.manager.activate(content.id, video.id).await {
            tracing::warn!(
                content_id = %content.id,
                video_id = %video.id,
                error = %e,
                "Dated rotation failed; will retry next tick"
            );
        }
    }
}

/// Next video id in the rotation cycle after the currently active one. An
/// unknown or absent current selection restarts the cycle at the front.
fn next_in_cycle(videos: &[Video], current: Option<Uuid>) -> Uuid {
    let position = current.and_then(|id| videos.iter().position(|v| v.id == id));
    match position {
        Some(i) => videos[(i + 1) % videos.len()].id,
        None => videos[0].id,
    }
}
