//! Job execution error types
//!
//! Wraps an error with a recoverable/unrecoverable flag so that job handlers
//! can tell the runner whether an attempt should be retried or failed
//! immediately.

use std::fmt;

use crate::PipelineError;

/// Job execution error that can be either recoverable or unrecoverable.
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// Create an unrecoverable job error.
    ///
    /// Unrecoverable errors fail the job immediately without retrying:
    /// invalid input, quota rejections, ownership conflicts.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a recoverable job error.
    ///
    /// Recoverable errors are retried according to the job's retry policy:
    /// transient network failures, compiler/scaler crashes, storage I/O.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Default conversion treats unknown errors as recoverable.
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

impl From<PipelineError> for JobError {
    /// Carries the taxonomy's retry policy over to job execution.
    fn from(err: PipelineError) -> Self {
        let recoverable = err.is_recoverable();
        Self {
            inner: err.into(),
            recoverable,
        }
    }
}

/// Extension trait for Result to easily create unrecoverable job errors.
pub trait JobResultExt<T> {
    /// Mark this result as unrecoverable on error.
    fn unrecoverable(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::unrecoverable(e.into()))
    }
}
