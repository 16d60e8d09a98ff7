use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::process::ProcessEntry;
use super::source::MetricKind;

/// One complete, immutable telemetry reading for a single sampling cycle.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub collected_at_unix_ms: u64,
    pub cpu: CpuInfo,
    pub gpu: Vec<GpuInfo>,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    pub processes: Vec<ProcessEntry>,
    pub network: BTreeMap<String, InterfaceInfo>,
    /// Pin state after reconciliation. When set, `processes[0]` is the pinned entry.
    pub pinned_pid: Option<u32>,
    /// Metric domains whose adapter failed this cycle, with the reason.
    pub unavailable: BTreeMap<MetricKind, String>,
}

impl Snapshot {
    pub fn is_available(&self, kind: MetricKind) -> bool {
        !self.unavailable.contains_key(&kind)
    }

    pub fn pinned_process(&self) -> Option<&ProcessEntry> {
        let pid = self.pinned_pid?;
        self.processes.first().filter(|p| p.pid == pid)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CpuInfo {
    pub model: String,
    pub physical_cores: Option<usize>,
    pub logical_cores: usize,
    pub frequency_ghz: Option<f64>,
    pub temperature_c: Option<f64>,
    pub load_percent: f32,
}

impl CpuInfo {
    pub fn unavailable() -> Self {
        CpuInfo {
            model: "N/A".to_string(),
            physical_cores: None,
            logical_cores: 0,
            frequency_ghz: None,
            temperature_c: None,
            load_percent: 0.0,
        }
    }
}

/// Fields the driver reports as `[N/A]` are `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GpuInfo {
    pub name: String,
    pub memory_used_gb: Option<f64>,
    pub memory_total_gb: Option<f64>,
    pub load_percent: Option<f32>,
    pub temperature_c: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

impl MemoryInfo {
    pub fn available_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

impl DiskInfo {
    pub fn free_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InterfaceInfo {
    pub addresses: BTreeSet<String>,
    pub is_up: bool,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Share of `used` in `total` as a percentage, clamped to `[0, 100]`.
pub fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
