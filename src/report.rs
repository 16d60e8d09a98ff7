//! Plain-text rendering of a snapshot for the headless CLI.

use std::fmt::Write;

use crate::format::{format_bytes, format_optional, pad_unicode};
use crate::system::{MetricKind, Snapshot};

const NAME_WIDTH: usize = 24;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn render_text(snapshot: &Snapshot, top: usize) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, snapshot, top);
    out
}

fn write_report(out: &mut String, s: &Snapshot, top: usize) -> std::fmt::Result {
    writeln!(out, "── cycle {} ──", s.cycle)?;

    let cpu = &s.cpu;
    let cores = match cpu.physical_cores {
        Some(physical) => format!("{physical}/{}", cpu.logical_cores),
        None => format!("?/{}", cpu.logical_cores),
    };
    writeln!(
        out,
        "CPU     {} | {} cores | {} | {} | load {:.1}%",
        cpu.model,
        cores,
        format_optional(cpu.frequency_ghz.map(|f| format!("{f:.1}")), " GHz"),
        format_optional(cpu.temperature_c.map(|t| format!("{t:.1}")), "°C"),
        cpu.load_percent
    )?;

    let mem = &s.memory;
    writeln!(
        out,
        "Memory  {} / {} ({:.1}%), {} available",
        format_bytes(mem.used_bytes),
        format_bytes(mem.total_bytes),
        mem.percent,
        format_bytes(mem.available_bytes())
    )?;

    if s.gpu.is_empty() {
        writeln!(out, "GPU     No GPU detected")?;
    }
    for gpu in &s.gpu {
        writeln!(
            out,
            "GPU     {} | {}/{} | load {} | {}",
            gpu.name,
            format_optional(gpu.memory_used_gb.map(|m| format!("{m:.1}")), ""),
            format_optional(gpu.memory_total_gb.map(|m| format!("{m:.0}")), " GB"),
            format_optional(gpu.load_percent.map(|l| format!("{l:.0}")), "%"),
            format_optional(gpu.temperature_c.map(|t| format!("{t:.0}")), "°C")
        )?;
    }

    for disk in &s.disks {
        writeln!(
            out,
            "Disk    {} on {} | {:.1}G used, {:.1}G free of {:.1}G ({:.1}%)",
            disk.device,
            disk.mount_point,
            disk.used_bytes as f64 / BYTES_PER_GB,
            disk.free_bytes() as f64 / BYTES_PER_GB,
            disk.total_bytes as f64 / BYTES_PER_GB,
            disk.percent
        )?;
    }

    for (name, iface) in &s.network {
        let addresses: Vec<&str> = iface.addresses.iter().map(String::as_str).collect();
        writeln!(
            out,
            "Net     {} [{}] {} | sent {} | recv {}",
            name,
            if iface.is_up { "Up" } else { "Down" },
            addresses.join(", "),
            format_bytes(iface.bytes_sent),
            format_bytes(iface.bytes_recv)
        )?;
    }

    writeln!(
        out,
        "{:>8}  {}  {:>6}  {:>10}",
        "PID",
        pad_unicode("NAME", NAME_WIDTH),
        "CPU%",
        "RSS"
    )?;
    for process in s.processes.iter().take(top) {
        let marker = if s.pinned_pid == Some(process.pid) { '*' } else { ' ' };
        writeln!(
            out,
            "{marker}{:>7}  {}  {:>6.1}  {:>10}",
            process.pid,
            pad_unicode(&process.name, NAME_WIDTH),
            process.cpu_percent,
            format_bytes(process.resident_memory_bytes)
        )?;
    }

    for kind in MetricKind::ALL {
        if let Some(reason) = s.unavailable.get(&kind) {
            writeln!(out, "!       {kind} unavailable: {reason}")?;
        }
    }
    Ok(())
}
