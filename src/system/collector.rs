use std::collections::{BTreeMap, BTreeSet};

use sysinfo::{Disks, Networks, Pid, ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind};

use super::gpu::GpuProbe;
use super::platform;
use super::process::ProcessEntry;
use super::snapshot::{CpuInfo, DiskInfo, GpuInfo, InterfaceInfo, MemoryInfo};
use super::source::{MetricError, MetricResult, MetricSource};

const UNKNOWN_MODEL: &str = "Unknown";

/// Production [`MetricSource`] backed by `sysinfo`, platform readers and
/// `nvidia-smi`. The `System` lives across cycles so CPU usage has a
/// baseline to diff against.
pub struct SysinfoSource {
    sys: System,
    gpu: Option<GpuProbe>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new(Some(GpuProbe::default()))
    }
}

impl SysinfoSource {
    /// `gpu: None` disables GPU probing; the GPU field is then always empty.
    pub fn new(gpu: Option<GpuProbe>) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, bulk_refresh());
        SysinfoSource { sys, gpu }
    }

    /// `None` for userland threads, which sysinfo lists next to their
    /// process on Linux. Kernel threads are real tasks and stay.
    fn entry(pid: Pid, process: &sysinfo::Process) -> Option<ProcessEntry> {
        if process.thread_kind() == Some(ThreadKind::Userland) {
            return None;
        }
        Some(ProcessEntry::new(
            pid.as_u32(),
            process.name().to_string_lossy(),
            process.cpu_usage(),
            process.memory(),
        ))
    }
}

fn bulk_refresh() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_memory()
        .with_cpu()
        .without_tasks()
}

impl MetricSource for SysinfoSource {
    fn cpu(&mut self) -> MetricResult<CpuInfo> {
        self.sys.refresh_cpu_all();

        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(MetricError::Unavailable("no cpus reported".into()));
        }

        let model = platform::cpu_model()
            .ok()
            .or_else(|| {
                let brand = cpus[0].brand().trim();
                (!brand.is_empty()).then(|| platform::clean_cpu_model(brand))
            })
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string());

        let frequency_mhz = cpus[0].frequency();
        let frequency_ghz = (frequency_mhz > 0).then(|| frequency_mhz as f64 / 1000.0);

        Ok(CpuInfo {
            model,
            physical_cores: System::physical_core_count(),
            logical_cores: cpus.len(),
            frequency_ghz,
            temperature_c: platform::cpu_temperature().ok(),
            load_percent: self.sys.global_cpu_usage().clamp(0.0, 100.0),
        })
    }

    fn gpu(&mut self) -> MetricResult<Vec<GpuInfo>> {
        match &self.gpu {
            Some(probe) => probe.query(),
            None => Ok(Vec::new()),
        }
    }

    fn memory(&mut self) -> MetricResult<MemoryInfo> {
        self.sys.refresh_memory();

        let total_bytes = self.sys.total_memory();
        if total_bytes == 0 {
            return Err(MetricError::Unavailable("total memory reported as zero".into()));
        }

        Ok(MemoryInfo {
            total_bytes,
            used_bytes: self.sys.used_memory(),
            percent: 0.0,
            swap_total_bytes: self.sys.total_swap(),
            swap_used_bytes: self.sys.used_swap(),
        })
    }

    fn disks(&mut self) -> MetricResult<Vec<DiskInfo>> {
        let disks = Disks::new_with_refreshed_list();

        Ok(disks
            .list()
            .iter()
            .map(|disk| {
                let device = disk.name().to_string_lossy();
                let device = device.rsplit('/').next().unwrap_or_default().to_string();
                let total_bytes = disk.total_space();
                DiskInfo {
                    device,
                    mount_point: disk.mount_point().to_string_lossy().to_string(),
                    total_bytes,
                    used_bytes: total_bytes.saturating_sub(disk.available_space()),
                    percent: 0.0,
                }
            })
            .collect())
    }

    fn processes(&mut self) -> MetricResult<Vec<ProcessEntry>> {
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, bulk_refresh());

        let processes: Vec<ProcessEntry> = self
            .sys
            .processes()
            .iter()
            .filter_map(|(pid, process)| Self::entry(*pid, process))
            .collect();

        if processes.is_empty() {
            return Err(MetricError::PermissionDenied("process table is empty".into()));
        }
        Ok(processes)
    }

    fn network(&mut self) -> MetricResult<BTreeMap<String, InterfaceInfo>> {
        let networks = Networks::new_with_refreshed_list();

        Ok(networks
            .list()
            .iter()
            .map(|(name, data)| {
                let mut addresses: BTreeSet<String> = data
                    .ip_networks()
                    .iter()
                    .map(|net| net.addr.to_string())
                    .collect();
                let mac = data.mac_address();
                if !mac.is_unspecified() {
                    addresses.insert(mac.to_string());
                }

                let info = InterfaceInfo {
                    addresses,
                    is_up: platform::interface_is_up(name).unwrap_or(false),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                };
                (name.clone(), info)
            })
            .collect())
    }

    /// Re-reads liveness and memory only. CPU usage is a delta between two
    /// refreshes, so it comes from this cycle's bulk refresh; refreshing it
    /// again a few milliseconds later would read as zero.
    fn probe_process(&mut self, pid: u32) -> Option<ProcessEntry> {
        let sys_pid = Pid::from_u32(pid);
        // Only pids the bulk refresh saw. A thread id refreshed on its own
        // would look like a process.
        self.sys.process(sys_pid)?;
        let pids = [sys_pid];
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_memory().without_tasks(),
        );
        self.sys
            .process(sys_pid)
            .and_then(|process| Self::entry(sys_pid, process))
    }
}
