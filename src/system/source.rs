//! Metric source seam: one fallible adapter per metric domain.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::process::ProcessEntry;
use super::snapshot::{CpuInfo, DiskInfo, GpuInfo, InterfaceInfo, MemoryInfo};

/// Why an adapter could not produce its reading.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The platform offers no interface for this reading.
    #[error("unsupported on this platform")]
    Unsupported,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MetricResult<T> = Result<T, MetricError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Gpu,
    Memory,
    Disks,
    Processes,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Cpu,
        MetricKind::Gpu,
        MetricKind::Memory,
        MetricKind::Disks,
        MetricKind::Processes,
        MetricKind::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Gpu => "gpu",
            MetricKind::Memory => "memory",
            MetricKind::Disks => "disks",
            MetricKind::Processes => "processes",
            MetricKind::Network => "network",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A provider of raw host readings.
///
/// Every method must convert its own OS errors, missing sensors and
/// permission problems into a [`MetricError`]; none may panic on an
/// expected failure. The builder normalizes whatever comes back.
pub trait MetricSource: Send + 'static {
    fn cpu(&mut self) -> MetricResult<CpuInfo>;

    /// An empty vector means no GPU is present; that is not a failure.
    fn gpu(&mut self) -> MetricResult<Vec<GpuInfo>>;

    fn memory(&mut self) -> MetricResult<MemoryInfo>;

    fn disks(&mut self) -> MetricResult<Vec<DiskInfo>>;

    fn processes(&mut self) -> MetricResult<Vec<ProcessEntry>>;

    fn network(&mut self) -> MetricResult<BTreeMap<String, InterfaceInfo>>;

    /// Fresh, authoritative reading for a single process, if the source
    /// can query one. `None` means the process is gone or the source has
    /// no such query.
    fn probe_process(&mut self, _pid: u32) -> Option<ProcessEntry> {
        None
    }
}

impl<S: MetricSource + ?Sized> MetricSource for Box<S> {
    fn cpu(&mut self) -> MetricResult<CpuInfo> {
        (**self).cpu()
    }

    fn gpu(&mut self) -> MetricResult<Vec<GpuInfo>> {
        (**self).gpu()
    }

    fn memory(&mut self) -> MetricResult<MemoryInfo> {
        (**self).memory()
    }

    fn disks(&mut self) -> MetricResult<Vec<DiskInfo>> {
        (**self).disks()
    }

    fn processes(&mut self) -> MetricResult<Vec<ProcessEntry>> {
        (**self).processes()
    }

    fn network(&mut self) -> MetricResult<BTreeMap<String, InterfaceInfo>> {
        (**self).network()
    }

    fn probe_process(&mut self, pid: u32) -> Option<ProcessEntry> {
        (**self).probe_process(pid)
    }
}
