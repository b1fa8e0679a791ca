//! Marker compiler capability.
//!
//! The compiler turning a source image into tracking features is an external
//! black-box tool. It is modeled as a trait so the pipeline never depends on
//! a concrete binary; the CLI implementation shells out with a time bound
//! and captured diagnostics.

use anyhow::Context;
use arlink_core::PipelineError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// External capability that produces tracking features from a source image.
#[async_trait]
pub trait MarkerCompiler: Send + Sync {
    /// Compile `image_path` into an opaque tracking payload.
    ///
    /// Implementations are time-bounded; a hung tool surfaces as
    /// `CompilerFailure`, not an indefinite stall.
    async fn compile(
        &self,
        image_path: &Path,
        max_features: u32,
    ) -> Result<serde_json::Value, PipelineError>;
}

/// Shells out to a marker compiler binary.
///
/// Invocation: `<binary> --input <image> --output <json> --max-features <n>`.
/// The tool writes the tracking payload as JSON to the output path.
pub struct CliMarkerCompiler {
    binary_path: String,
    timeout: Duration,
}

impl CliMarkerCompiler {
    pub fn new(binary_path: String, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }
}

#[async_trait]
impl MarkerCompiler for CliMarkerCompiler {
    async fn compile(
        &self,
        image_path: &Path,
        max_features: u32,
    ) -> Result<serde_json::Value, PipelineError> {
        let output_path = image_path.with_extension("features.json");
        let start = std::time::Instant::now();

        let command = Command::new(&self.binary_path)
            .arg("--input")
            .arg(image_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--max-features")
            .arg(max_features.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_| PipelineError::CompilerFailure {
                diagnostics: format!(
                    "Compiler timed out after {}s",
                    self.timeout.as_secs()
                ),
            })?
            .map_err(|e| PipelineError::CompilerFailure {
                diagnostics: format!("Failed to execute {}: {}", self.binary_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::CompilerFailure {
                diagnostics: stderr.trim().to_string(),
            });
        }

        let payload = tokio::fs::read(&output_path)
            .await
            .context("Compiler reported success but produced no output")
            .map_err(|e| PipelineError::CompilerFailure {
                diagnostics: e.to_string(),
            })?;

        let tracking_data: serde_json::Value =
            serde_json::from_slice(&payload).map_err(|e| PipelineError::CompilerFailure {
                diagnostics: format!("Compiler produced malformed JSON: {}", e),
            })?;

        tracing::info!(
            binary = %self.binary_path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Marker compilation successful"
        );

        Ok(tracking_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_compiler_failure() {
        let compiler = CliMarkerCompiler::new(
            "/nonexistent/marker-compiler".to_string(),
            Duration::from_secs(5),
        );

        let err = compiler
            .compile(Path::new("/tmp/does-not-matter.png"), 100)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::CompilerFailure { .. }));
        assert!(err.is_recoverable());
    }
}
