//! Terminal-failure notification.
//!
//! The job runner emits exactly one notification when a job exhausts its
//! retry budget. Delivery goes to an external notification collaborator;
//! here that is a webhook endpoint with bounded retries, or plain logging
//! when no endpoint is configured.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use arlink_core::models::JobKind;

/// Notification sink for terminal job failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report that processing for `content_id`/`kind` failed terminally.
    /// Best-effort: implementations log delivery problems, they do not
    /// propagate them back into the job runner.
    async fn notify(&self, content_id: Uuid, kind: JobKind, error_summary: &str);
}

/// Notifier that only logs. Used when no webhook endpoint is configured and
/// as the default in tests.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, content_id: Uuid, kind: JobKind, error_summary: &str) {
        tracing::error!(
            content_id = %content_id,
            job_kind = %kind,
            error = %error_summary,
            "Processing failed terminally"
        );
    }
}

#[derive(Clone)]
pub struct WebhookNotifierConfig {
    pub url: String,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl WebhookNotifierConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// POSTs a JSON body to a configured webhook URL, retrying transient
/// delivery failures with linear backoff.
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookNotifierConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, content_id: Uuid, kind: JobKind, error_summary: &str) {
        let body = serde_json::json!({
            "event": "processing_failed",
            "content_id": content_id,
            "operation": kind,
            "error": error_summary,
        });

        for attempt in 1..=self.config.max_attempts {
            let result = self
                .client
                .post(&self.config.url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(_) => {
                    tracing::info!(
                        content_id = %content_id,
                        job_kind = %kind,
                        attempt = attempt,
                        "Failure notification delivered"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        content_id = %content_id,
                        job_kind = %kind,
                        attempt = attempt,
                        error = %e,
                        "Failure notification delivery failed"
                    );
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.backoff * attempt).await;
                    }
                }
            }
        }

        tracing::error!(
            content_id = %content_id,
            job_kind = %kind,
            "Giving up on failure notification delivery"
        );
    }
}
