use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::process::{DEFAULT_PROCESS_LIMIT, rank_processes};
use super::snapshot::{CpuInfo, DiskInfo, MemoryInfo, Snapshot, percent_of};
use super::source::{MetricError, MetricKind, MetricResult, MetricSource};

/// Runs one sampling cycle against a [`MetricSource`] and assembles a
/// complete [`Snapshot`], whatever subset of adapters succeeded.
#[derive(Debug)]
pub struct SnapshotBuilder {
    process_limit: usize,
    cycle: u64,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_LIMIT)
    }
}

impl SnapshotBuilder {
    pub fn new(process_limit: usize) -> Self {
        SnapshotBuilder {
            process_limit,
            cycle: 0,
        }
    }

    pub fn process_limit(&self) -> usize {
        self.process_limit
    }

    pub fn cycles_built(&self) -> u64 {
        self.cycle
    }

    pub fn build<S: MetricSource + ?Sized>(&mut self, source: &mut S) -> Snapshot {
        let _span = tracing::debug_span!("builder.build", cycle = self.cycle + 1).entered();
        let started = Instant::now();
        self.cycle += 1;

        let collected_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut unavailable = BTreeMap::new();

        let cpu = settle(MetricKind::Cpu, source.cpu(), &mut unavailable)
            .unwrap_or_else(CpuInfo::unavailable);
        let gpu = settle(MetricKind::Gpu, source.gpu(), &mut unavailable).unwrap_or_default();
        let memory = settle(MetricKind::Memory, source.memory(), &mut unavailable)
            .map(normalize_memory)
            .unwrap_or_default();
        let disks = settle(MetricKind::Disks, source.disks(), &mut unavailable)
            .map(normalize_disks)
            .unwrap_or_default();
        let processes = settle(MetricKind::Processes, source.processes(), &mut unavailable)
            .map(|list| rank_processes(list, self.process_limit))
            .unwrap_or_default();
        let network =
            settle(MetricKind::Network, source.network(), &mut unavailable).unwrap_or_default();

        tracing::debug!(
            cycle = self.cycle,
            elapsed_ms = started.elapsed().as_millis() as u64,
            processes = processes.len(),
            failed = unavailable.len(),
            "snapshot built"
        );

        Snapshot {
            cycle: self.cycle,
            collected_at_unix_ms,
            cpu,
            gpu,
            memory,
            disks,
            processes,
            network,
            pinned_pid: None,
            unavailable,
        }
    }
}

fn settle<T>(
    kind: MetricKind,
    result: MetricResult<T>,
    unavailable: &mut BTreeMap<MetricKind, String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            match &err {
                MetricError::Unsupported => tracing::debug!(metric = %kind, "{err}"),
                _ => tracing::warn!(metric = %kind, error = %err, "metric unavailable this cycle"),
            }
            unavailable.insert(kind, err.to_string());
            None
        }
    }
}

fn normalize_memory(mut memory: MemoryInfo) -> MemoryInfo {
    memory.used_bytes = memory.used_bytes.min(memory.total_bytes);
    memory.swap_used_bytes = memory.swap_used_bytes.min(memory.swap_total_bytes);
    memory.percent = percent_of(memory.used_bytes, memory.total_bytes);
    memory
}

fn normalize_disks(disks: Vec<DiskInfo>) -> Vec<DiskInfo> {
    disks
        .into_iter()
        .filter(|disk| !disk.mount_point.is_empty())
        .map(|mut disk| {
            disk.used_bytes = disk.used_bytes.min(disk.total_bytes);
            disk.percent = percent_of(disk.used_bytes, disk.total_bytes);
            disk
        })
        .collect()
}
