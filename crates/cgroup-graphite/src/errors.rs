// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the sampler and the shared sink.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the shared connection to the collector
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("failed to write to collector: {0}")]
    Write(#[source] io::Error),
}

/// Errors that end a sampler task.
///
/// A missing source file is not an error: the tick is skipped.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to send {metric}: {source}")]
    Send { metric: String, source: SinkError },

    #[error("sampling interval {0:?} is too long to schedule")]
    IntervalTooLong(Duration),
}

/// Errors that end the whole set of samplers
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("sampler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SamplerError {
    /// Whether the fault lies with the task's own source file rather than the shared sink.
    pub fn is_source_fault(&self) -> bool {
        matches!(self, SamplerError::Read { .. })
    }
}
