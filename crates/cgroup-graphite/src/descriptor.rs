// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric descriptors: which cgroup v1 accounting file is reported under which metric name.

use crate::escape::escape;
use std::path::{Path, PathBuf};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
pub const DEFAULT_METRIC_PREFIX: &str = "cg2gr";

/// The two accounting files sampled for every systemd service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Total CPU time, in nanoseconds, consumed by all tasks in the service's cgroup
    CpuUsage,
    /// Current memory usage, in bytes, of the service's cgroup
    MemoryUsage,
}

impl CounterKind {
    pub const ALL: [CounterKind; 2] = [CounterKind::CpuUsage, CounterKind::MemoryUsage];

    fn controller(self) -> &'static str {
        match self {
            CounterKind::CpuUsage => "cpu",
            CounterKind::MemoryUsage => "memory",
        }
    }

    /// File name inside the service's cgroup directory; also the metric name suffix.
    fn file_name(self) -> &'static str {
        match self {
            CounterKind::CpuUsage => "cpuacct.usage",
            CounterKind::MemoryUsage => "memory.usage_in_bytes",
        }
    }
}

/// Pairs a source file with the metric name its value is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    source_path: PathBuf,
    metric_name: String,
}

impl MetricDescriptor {
    pub fn new(source_path: impl Into<PathBuf>, metric_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            metric_name: metric_name.into(),
        }
    }

    /// Builds the descriptor of one counter of one service.
    ///
    /// The service name is used verbatim as a filesystem segment so it matches the
    /// real cgroup hierarchy, and escaped in the metric name.
    pub fn for_counter(
        cgroup_root: &Path,
        prefix: &str,
        host: &str,
        service: &str,
        kind: CounterKind,
    ) -> Self {
        let source_path = cgroup_root
            .join(kind.controller())
            .join("system.slice")
            .join(format!("{service}.service"))
            .join(kind.file_name());
        let metric_name = format!(
            "{prefix}.{}.services.{}.{}",
            escape(host),
            escape(service),
            kind.file_name()
        );
        Self::new(source_path, metric_name)
    }

    /// Builds the CPU and memory descriptors of one service, in that order.
    pub fn for_service(cgroup_root: &Path, prefix: &str, host: &str, service: &str) -> [Self; 2] {
        CounterKind::ALL.map(|kind| Self::for_counter(cgroup_root, prefix, host, service, kind))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }
}

/// Builds the descriptors of every configured service, two per service.
pub fn build_descriptors<S: AsRef<str>>(
    cgroup_root: &Path,
    prefix: &str,
    host: &str,
    services: &[S],
) -> Vec<MetricDescriptor> {
    services
        .iter()
        .flat_map(|service| MetricDescriptor::for_service(cgroup_root, prefix, host, service.as_ref()))
        .collect()
}
