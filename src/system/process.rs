use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

pub const DEFAULT_PROCESS_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub resident_memory_bytes: u64,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>, cpu_percent: f32, rss: u64) -> Self {
        ProcessEntry {
            pid,
            name: name.into(),
            cpu_percent: sanitize_cpu(cpu_percent),
            resident_memory_bytes: rss,
        }
    }
}

/// Busiest first; equal load falls back to the lower pid.
pub fn cpu_order(a: &ProcessEntry, b: &ProcessEntry) -> Ordering {
    sanitize_cpu(b.cpu_percent)
        .total_cmp(&sanitize_cpu(a.cpu_percent))
        .then(a.pid.cmp(&b.pid))
}

/// Turn a raw enumeration into the published process list: unique pids
/// (first occurrence wins), named entries only, ordered by [`cpu_order`],
/// and cut to `limit` after sorting.
pub fn rank_processes(processes: Vec<ProcessEntry>, limit: usize) -> Vec<ProcessEntry> {
    let mut seen = HashSet::with_capacity(processes.len());
    let mut ranked: Vec<ProcessEntry> = processes
        .into_iter()
        .filter(|p| !p.name.is_empty())
        .filter(|p| seen.insert(p.pid))
        .map(|mut p| {
            p.cpu_percent = sanitize_cpu(p.cpu_percent);
            p
        })
        .collect();

    ranked.sort_by(cpu_order);
    ranked.truncate(limit);
    ranked
}

fn sanitize_cpu(cpu: f32) -> f32 {
    if cpu.is_finite() && cpu > 0.0 { cpu } else { 0.0 }
}
