//! Media scaler capability.
//!
//! External tool that produces a scaled preview frame from an image or
//! video. Modeled as a trait; the CLI implementation drives an ffmpeg-style
//! binary.

use arlink_core::PipelineError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// External capability that scales an image/video frame into a preview image.
#[async_trait]
pub trait MediaScaler: Send + Sync {
    async fn scale(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PipelineError>;
}

/// Drives an ffmpeg-compatible binary:
/// `<binary> -i <input> -vf scale=w:h -frames:v 1 -y <output>`.
///
/// ffmpeg takes the first frame for videos and the image itself otherwise,
/// so one invocation covers both source kinds.
pub struct CliMediaScaler {
    binary_path: String,
    timeout: Duration,
}

impl CliMediaScaler {
    pub fn new(binary_path: String, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }
}

#[async_trait]
impl MediaScaler for CliMediaScaler {
    async fn scale(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PipelineError> {
        let start = std::time::Instant::now();

        let command = Command::new(&self.binary_path)
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height))
            .arg("-frames:v")
            .arg("1")
            .arg("-y")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let result = tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_| PipelineError::ScalerFailure {
                diagnostics: format!("Scaler timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| PipelineError::ScalerFailure {
                diagnostics: format!("Failed to execute {}: {}", self.binary_path, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::ScalerFailure {
                diagnostics: stderr.trim().to_string(),
            });
        }

        tracing::info!(
            binary = %self.binary_path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Thumbnail scaling successful"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_scaler_failure() {
        let scaler =
            CliMediaScaler::new("/nonexistent/ffmpeg".to_string(), Duration::from_secs(5));

        let err = scaler
            .scale(
                Path::new("/tmp/in.jpg"),
                Path::new("/tmp/out.jpg"),
                320,
                180,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ScalerFailure { .. }));
        assert!(err.is_recoverable());
    }
}
