use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of asynchronous processing work. Each kind has its own queue so that
/// backpressure on one does not starve the other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Marker,
    Thumbnail,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Marker, JobKind::Thumbnail];
}

impl Display for JobKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobKind::Marker => write!(f, "marker"),
            JobKind::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marker" => Ok(JobKind::Marker),
            "thumbnail" => Ok(JobKind::Thumbnail),
            _ => Err(anyhow::anyhow!("Invalid job kind: {}", s)),
        }
    }
}

/// Ephemeral job record. Keyed by `(content_id, kind)` — at most one exists
/// per pair while it is queued or running; removed on terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub content_id: Uuid,
    pub kind: JobKind,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(content_id: Uuid, kind: JobKind) -> Self {
        Self {
            content_id,
            kind,
            attempt: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn key(&self) -> (Uuid, JobKind) {
        (self.content_id, self.kind)
    }
}
