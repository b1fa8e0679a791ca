//! Error types module
//!
//! This module provides the pipeline-wide error taxonomy. Transient classes
//! (upload, compiler, scaler) are retried by the job runner; validation,
//! quota and conflict classes are returned to the caller immediately.
//!
//! Content expiry is deliberately not an error: the viewer gate returns it
//! as a typed outcome so that callers can render it differently from 404s.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Quota exceeded: requested {requested} bytes, {available} bytes available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("Upload failure: {0}")]
    UploadFailure(String),

    #[error("Marker compiler failed: {diagnostics}")]
    CompilerFailure { diagnostics: String },

    #[error("Media scaler failed: {diagnostics}")]
    ScalerFailure { diagnostics: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Machine-readable error code for administrative callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
            PipelineError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            PipelineError::UploadFailure(_) => "UPLOAD_FAILURE",
            PipelineError::CompilerFailure { .. } => "COMPILER_FAILURE",
            PipelineError::ScalerFailure { .. } => "SCALER_FAILURE",
            PipelineError::Conflict(_) => "CONFLICT",
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::Internal(_) | PipelineError::InternalWithSource { .. } => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Whether the job runner may retry an attempt that failed with this error.
    ///
    /// Validation, quota and conflict errors will not change on retry; they
    /// are surfaced to the caller without touching the retry budget.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::UploadFailure(_)
                | PipelineError::CompilerFailure { .. }
                | PipelineError::ScalerFailure { .. }
                | PipelineError::Internal(_)
                | PipelineError::InternalWithSource { .. }
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for PipelineError {
    fn from(err: uuid::Error) -> Self {
        PipelineError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes_are_recoverable() {
        assert!(PipelineError::UploadFailure("socket reset".into()).is_recoverable());
        assert!(PipelineError::CompilerFailure {
            diagnostics: "segfault".into()
        }
        .is_recoverable());
        assert!(PipelineError::ScalerFailure {
            diagnostics: "oom".into()
        }
        .is_recoverable());
    }

    #[test]
    fn caller_error_classes_are_not_retried() {
        assert!(!PipelineError::InvalidInput("not an image".into()).is_recoverable());
        assert!(!PipelineError::QuotaExceeded {
            requested: 50,
            available: 40
        }
        .is_recoverable());
        assert!(!PipelineError::Conflict("video not owned".into()).is_recoverable());
        assert!(!PipelineError::NotFound("gone".into()).is_recoverable());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            PipelineError::QuotaExceeded {
                requested: 1,
                available: 0
            }
            .error_code(),
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            PipelineError::CompilerFailure {
                diagnostics: String::new()
            }
            .error_code(),
            "COMPILER_FAILURE"
        );
    }
}
