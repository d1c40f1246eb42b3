// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs one sampler task per metric descriptor and decides what a failing task means
//! for the others.

use crate::descriptor::MetricDescriptor;
use crate::errors::SupervisorError;
use crate::sampler::Sampler;
use crate::sink::Sink;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happens to the other samplers when one of them fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failure stops every sampler and is returned to the caller.
    #[default]
    FailFast,
    /// A failure to read a source file stops only that sampler.
    /// Sink failures still stop everything, the connection is never reopened.
    Isolate,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "isolate" => Ok(FailurePolicy::Isolate),
            other => Err(format!(
                "unknown failure policy '{other}', expected 'fail-fast' or 'isolate'"
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::Isolate => write!(f, "isolate"),
        }
    }
}

pub struct Supervisor<W> {
    sink: Sink<W>,
    interval: Duration,
    policy: FailurePolicy,
    cancel_token: CancellationToken,
}

impl<W> Supervisor<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        sink: Sink<W>,
        interval: Duration,
        policy: FailurePolicy,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            sink,
            interval,
            policy,
            cancel_token,
        }
    }

    /// Spawns one sampler per descriptor and waits.
    ///
    /// Returns `Ok(())` once the cancellation token fires and every sampler has stopped.
    /// Returns the first fatal error otherwise, after cancelling and reaping every
    /// other sampler.
    pub async fn run(self, descriptors: Vec<MetricDescriptor>) -> Result<(), SupervisorError> {
        let mut samplers = JoinSet::new();
        for descriptor in descriptors {
            let sampler = Sampler::new(descriptor, self.sink.clone());
            let cancel_token = self.cancel_token.clone();
            let interval = self.interval;
            samplers.spawn(async move { sampler.run(interval, cancel_token).await });
        }
        // Only the samplers hold the connection from here on.
        drop(self.sink);
        info!(
            "Started {} samplers, interval {:?}, failure policy {}",
            samplers.len(),
            self.interval,
            self.policy
        );

        let mut isolated = 0;
        while let Some(joined) = samplers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) if self.policy == FailurePolicy::Isolate && e.is_source_fault() => {
                    error!("Sampler stopped, others keep running: {e}");
                    isolated += 1;
                    continue;
                }
                Ok(Err(e)) => SupervisorError::from(e),
                Err(e) => SupervisorError::from(e),
            };

            error!("Stopping all samplers: {failure}");
            self.cancel_token.cancel();
            samplers.shutdown().await;
            return Err(failure);
        }

        if isolated > 0 && !self.cancel_token.is_cancelled() {
            warn!("All {isolated} samplers stopped on read faults, nothing left to sample until shutdown");
        }
        self.cancel_token.cancelled().await;
        debug!("All samplers stopped");
        Ok(())
    }
}
