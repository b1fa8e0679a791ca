//! Configuration module
//!
//! Env-driven configuration for storage backends, the job runner, the
//! processing capabilities and the rotation scheduler. `.env` files are
//! honored via dotenvy; every knob has a default suitable for local
//! development.

use std::env;

use crate::storage_types::BackendKind;

const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;
const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SCALE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MARKER_MAX_FEATURES: u32 = 1000;
const DEFAULT_THUMBNAIL_WIDTH: u32 = 320;
const DEFAULT_THUMBNAIL_HEIGHT: u32 = 180;
const DEFAULT_ROTATION_PERIOD_SECS: u64 = 86_400;
const DEFAULT_ROTATION_TICK_SECS: u64 = 300;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Storage backend selection and per-backend settings.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: BackendKind,
    // Local backend
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // S3 backend (custom endpoint for S3-compatible providers)
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    // OAuth cloud disk backend
    pub cloud_disk_api_base: Option<String>,
    pub cloud_disk_token: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(BackendKind::Local),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or(env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            cloud_disk_api_base: env::var("CLOUD_DISK_API_BASE").ok(),
            cloud_disk_token: env::var("CLOUD_DISK_TOKEN").ok(),
        }
    }
}

/// Job runner settings.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            max_workers: env_or("MAX_WORKERS", DEFAULT_MAX_WORKERS),
            max_retries: env_or("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            job_timeout_secs: env_or("JOB_TIMEOUT_SECONDS", DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

/// Rotation scheduler settings.
///
/// `period_secs` is the length of one rotation window ("daily" by default);
/// `tick_secs` is how often the scheduler wakes up. Windows are fixed-length
/// UTC intervals measured from the UNIX epoch, so a window boundary never
/// shifts with daylight-saving transitions.
#[derive(Clone, Debug)]
pub struct RotationConfig {
    pub period_secs: u64,
    pub tick_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_ROTATION_PERIOD_SECS,
            tick_secs: DEFAULT_ROTATION_TICK_SECS,
        }
    }
}

impl RotationConfig {
    pub fn from_env() -> Self {
        Self {
            period_secs: env_or("ROTATION_PERIOD_SECS", DEFAULT_ROTATION_PERIOD_SECS),
            tick_secs: env_or("ROTATION_TICK_SECS", DEFAULT_ROTATION_TICK_SECS),
        }
    }
}

/// Full pipeline configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub rotation: RotationConfig,
    // Marker compiler capability
    pub marker_compiler_path: String,
    pub marker_max_features: u32,
    pub compile_timeout_secs: u64,
    // Media scaler capability
    pub scaler_path: String,
    pub scale_timeout_secs: u64,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    // Terminal-failure notification
    pub notify_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from the environment, honoring a `.env` file.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            storage: StorageConfig::from_env(),
            worker: WorkerConfig::from_env(),
            rotation: RotationConfig::from_env(),
            marker_compiler_path: env::var("MARKER_COMPILER_PATH")
                .unwrap_or_else(|_| "marker-compiler".to_string()),
            marker_max_features: env_or("MARKER_MAX_FEATURES", DEFAULT_MARKER_MAX_FEATURES),
            compile_timeout_secs: env_or("COMPILE_TIMEOUT_SECONDS", DEFAULT_COMPILE_TIMEOUT_SECS),
            scaler_path: env::var("SCALER_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            scale_timeout_secs: env_or("SCALE_TIMEOUT_SECONDS", DEFAULT_SCALE_TIMEOUT_SECS),
            thumbnail_width: env_or("THUMBNAIL_WIDTH", DEFAULT_THUMBNAIL_WIDTH),
            thumbnail_height: env_or("THUMBNAIL_HEIGHT", DEFAULT_THUMBNAIL_HEIGHT),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn compiler_and_scaler_timeouts_are_independent() {
        let config = Config::from_env();
        assert_eq!(config.compile_timeout_secs, 120);
        assert_eq!(config.scale_timeout_secs, 60);
    }

    #[test]
    fn rotation_defaults_to_daily() {
        let config = RotationConfig::default();
        assert_eq!(config.period_secs, 86_400);
    }
}
