// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic sampling of one cgroup accounting file.
//!
//! Each sampler owns one [`MetricDescriptor`] and a fixed-rate timer. On every tick it
//! reads the source file, formats a Graphite plaintext line stamped with the tick's
//! scheduled time and writes it through the shared [`Sink`].
//!
//! A source file that does not exist is expected (the service may not be running yet,
//! or its cgroup was just torn down) and only skips the tick. Any other read error and
//! every sink error end the task.

use crate::descriptor::MetricDescriptor;
use crate::errors::SamplerError;
use crate::sink::Sink;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWrite;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

// tokio rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Formats `<metric> <value> <timestamp>\n`.
pub fn format_line(metric_name: &str, value: &[u8], unix_seconds: u64) -> Vec<u8> {
    let timestamp = unix_seconds.to_string();
    let mut line = Vec::with_capacity(metric_name.len() + value.len() + timestamp.len() + 3);
    line.extend_from_slice(metric_name.as_bytes());
    line.push(b' ');
    line.extend_from_slice(value);
    line.push(b' ');
    line.extend_from_slice(timestamp.as_bytes());
    line.push(b'\n');
    line
}

/// Maps the monotonic instants handed out by the timer back to wall-clock time.
#[derive(Debug, Clone, Copy)]
struct TickClock {
    instant: Instant,
    wall: SystemTime,
}

impl TickClock {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    fn unix_seconds(&self, tick: Instant) -> u64 {
        let wall = self.wall + tick.saturating_duration_since(self.instant);
        wall.duration_since(UNIX_EPOCH)
            .map(|since_epoch| since_epoch.as_secs())
            .unwrap_or_default()
    }
}

pub struct Sampler<W> {
    descriptor: MetricDescriptor,
    sink: Sink<W>,
}

impl<W> Sampler<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(descriptor: MetricDescriptor, sink: Sink<W>) -> Self {
        Self { descriptor, sink }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Reads the source file and formats the line for a tick scheduled at `unix_seconds`.
    ///
    /// Returns `Ok(None)` when the source file does not exist.
    pub async fn read_line(&self, unix_seconds: u64) -> Result<Option<Vec<u8>>, SamplerError> {
        let path = self.descriptor.source_path();
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("{} does not exist, skipping tick", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(SamplerError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Some(format_line(
            self.descriptor.metric_name(),
            contents.trim_ascii(),
            unix_seconds,
        )))
    }

    /// Runs one tick: read, format, send. Returns the line that was sent, if any.
    pub async fn sample_once(&self, unix_seconds: u64) -> Result<Option<Vec<u8>>, SamplerError> {
        let Some(line) = self.read_line(unix_seconds).await? else {
            return Ok(None);
        };
        self.sink
            .send(&line)
            .await
            .map_err(|source| SamplerError::Send {
                metric: self.descriptor.metric_name().to_string(),
                source,
            })?;
        Ok(Some(line))
    }

    /// Samples every `interval` until `cancel` fires or a tick fails.
    ///
    /// Ticks are scheduled at `start + k * interval` for k >= 1. When a tick overruns,
    /// the missed tick fires immediately and the following ones realign to the
    /// schedule; missed ticks are never queued up.
    pub async fn run(
        self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SamplerError> {
        let period = interval.max(MIN_INTERVAL);
        let clock = TickClock::now();
        let first_tick = clock
            .instant
            .checked_add(period)
            .ok_or(SamplerError::IntervalTooLong(period))?;
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            "Sampling {} into {} every {:?}",
            self.descriptor.source_path().display(),
            self.descriptor.metric_name(),
            period
        );

        loop {
            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Sampler for {} cancelled", self.descriptor.metric_name());
                    return Ok(());
                }
                tick = ticker.tick() => tick,
            };
            self.sample_once(clock.unix_seconds(tick)).await?;
        }
    }
}
