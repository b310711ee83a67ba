// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;
use tk_adapters::BackendError;
use tk_reporter::{LogBufferError, ReportError};

/// Errors raised while driving a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reports can no longer be delivered; the process must exit non-zero.
    #[error("reporting failed: {0}")]
    Fatal(#[source] ReportError),
    /// The environment failed; the build is reported as failed and teardown continues.
    #[error(transparent)]
    Recoverable(#[from] BackendError),
    #[error("console log unavailable: {0}")]
    Log(#[from] LogBufferError),
}

impl EngineError {
    /// Whether the process must stop instead of reporting a failed build.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Recoverable(_))
    }
}

/// Classify a reporter outcome: delivery exhaustion is fatal, anything
/// else is logged and the run carries on.
pub(crate) fn reported(outcome: Result<(), ReportError>) -> Result<(), EngineError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(EngineError::Fatal(e)),
        Err(e) => {
            tracing::warn!(error = %e, "report not delivered");
            Ok(())
        }
    }
}
