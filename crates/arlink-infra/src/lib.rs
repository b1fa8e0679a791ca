//! Arlink infrastructure: telemetry init and the terminal-failure notifier.

pub mod notify;
pub mod telemetry;

pub use notify::{LogNotifier, Notifier, WebhookNotifier, WebhookNotifierConfig};
pub use telemetry::init_telemetry;
