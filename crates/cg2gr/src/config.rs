// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use cgroup_graphite::descriptor::{DEFAULT_CGROUP_ROOT, DEFAULT_METRIC_PREFIX};
use cgroup_graphite::supervisor::FailurePolicy;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_INTERVAL: &str = "60s";
const DEFAULT_COLLECTOR_HOST: &str = "127.0.0.1";
const DEFAULT_COLLECTOR_PORT: u16 = 2003;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Ships per-service cgroup CPU and memory usage to a Graphite plaintext collector
#[derive(Parser, Debug, Clone)]
#[command(name = "cg2gr", version, about, disable_help_flag = true)]
pub struct Args {
    /// Sampling interval, e.g. 500ms, 30s, 5m, 1h (bare numbers are seconds)
    #[arg(short, long, default_value = DEFAULT_INTERVAL, value_parser = parse_interval)]
    pub interval: Duration,

    /// Collector host
    #[arg(short = 'h', long, default_value = DEFAULT_COLLECTOR_HOST)]
    pub host: String,

    /// Collector port
    #[arg(short, long, default_value_t = DEFAULT_COLLECTOR_PORT)]
    pub port: u16,

    /// systemd service to sample, without the .service suffix (repeatable)
    #[arg(short, long = "service", value_name = "SERVICE")]
    pub services: Vec<String>,

    /// First segment of every metric name
    #[arg(long, default_value = DEFAULT_METRIC_PREFIX)]
    pub prefix: String,

    /// Mount point of the cgroup v1 hierarchies
    #[arg(long, default_value = DEFAULT_CGROUP_ROOT)]
    pub cgroup_root: PathBuf,

    /// What a sampler failure does to the others: fail-fast or isolate
    #[arg(long, default_value = "fail-fast")]
    pub on_error: FailurePolicy,

    /// Log filter, e.g. info or cgroup_graphite=debug
    #[arg(long, env = "CG2GR_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,
}

// Longest interval a signed 64-bit nanosecond count can hold, about 292 years.
const MAX_INTERVAL: Duration = Duration::from_secs(i64::MAX as u64 / 1_000_000_000);

/// Parses a duration like "500ms", "30s", "5m" or "1h". A bare number is seconds.
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit): (&str, fn(u64) -> Option<Duration>) =
        if let Some(ms) = s.strip_suffix("ms") {
            (ms, from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, from_mins)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, from_hours)
        } else {
            (s, from_secs)
        };

    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    let interval = unit(value)
        .filter(|interval| *interval <= MAX_INTERVAL)
        .ok_or_else(|| format!("interval '{s}' is too large, the maximum is {MAX_INTERVAL:?}"))?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

fn from_millis(millis: u64) -> Option<Duration> {
    Some(Duration::from_millis(millis))
}

fn from_secs(secs: u64) -> Option<Duration> {
    Some(Duration::from_secs(secs))
}

fn from_mins(mins: u64) -> Option<Duration> {
    mins.checked_mul(60).map(Duration::from_secs)
}

fn from_hours(hours: u64) -> Option<Duration> {
    hours.checked_mul(3600).map(Duration::from_secs)
}
