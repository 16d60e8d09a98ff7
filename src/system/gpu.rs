//! NVIDIA GPU readings via `nvidia-smi`.

use std::io::{self, ErrorKind, Read};
use std::process::{Command, Output, Stdio};
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::snapshot::GpuInfo;
use super::source::{MetricError, MetricResult};

pub const DEFAULT_GPU_COMMAND: &str = "nvidia-smi";
pub const DEFAULT_GPU_TIMEOUT: Duration = Duration::from_secs(2);

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=name,memory.used,memory.total,utilization.gpu,temperature.gpu",
    "--format=csv,noheader,nounits",
];
const POLL_STEP: Duration = Duration::from_millis(10);
const MIB_PER_GB: f64 = 1024.0;

#[derive(Clone, Debug)]
pub struct GpuProbe {
    command: String,
    timeout: Duration,
}

impl Default for GpuProbe {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_COMMAND, DEFAULT_GPU_TIMEOUT)
    }
}

impl GpuProbe {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        GpuProbe {
            command: command.into(),
            timeout,
        }
    }

    /// Query every visible device. A host without the query tool has no GPU
    /// we can see, which is reported as an empty list.
    pub fn query(&self) -> MetricResult<Vec<GpuInfo>> {
        let mut command = Command::new(&self.command);
        command.args(QUERY_ARGS);

        let output = match run_bounded(&mut command, self.timeout) {
            Ok(Some(output)) => output,
            Ok(None) => return Err(MetricError::Timeout),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                return Err(MetricError::PermissionDenied(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = first_line(&stderr)
                .or_else(|| first_line(&stdout))
                .unwrap_or_else(|| format!("{} exited with {}", self.command, output.status));
            return Err(MetricError::Unavailable(reason));
        }

        Ok(parse_query_output(&stdout))
    }
}

/// Run `command` to completion, killing it after `timeout`. `Ok(None)` means
/// it timed out. Both pipes are drained while waiting so a chatty child
/// cannot stall on a full pipe.
pub fn run_bounded(command: &mut Command, timeout: Duration) -> io::Result<Option<Output>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = (stdout.join(), stderr.join());
                return Ok(None);
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        }
    };

    Ok(Some(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Parse `name, mem_used_mib, mem_total_mib, util_pct, temp_c` rows.
/// `[N/A]` and `[Not Supported]` values become `None`; rows with the wrong
/// shape or an unparsable number are skipped.
pub fn parse_query_output(output: &str) -> Vec<GpuInfo> {
    output.lines().filter_map(parse_row).collect()
}

fn parse_row(line: &str) -> Option<GpuInfo> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [name, used, total, load, temp] = fields.as_slice() else {
        return None;
    };
    if name.is_empty() {
        return None;
    }
    let used_mib: Option<f64> = parse_field(used)?;
    let total_mib: Option<f64> = parse_field(total)?;
    let load: Option<f32> = parse_field(load)?;
    let temperature: Option<f32> = parse_field(temp)?;

    let used_mib = match (used_mib, total_mib) {
        (Some(used), Some(total)) => Some(used.min(total)),
        (used, _) => used,
    };

    Some(GpuInfo {
        name: name.to_string(),
        memory_used_gb: used_mib.map(|mib| mib / MIB_PER_GB),
        memory_total_gb: total_mib.map(|mib| mib / MIB_PER_GB),
        load_percent: load.map(|l| l.clamp(0.0, 100.0)),
        temperature_c: temperature,
    })
}

/// Outer `None`: garbage. Inner `None`: the driver has no value.
fn parse_field<T: FromStr>(raw: &str) -> Option<Option<T>> {
    if (raw.starts_with('[') && raw.ends_with(']')) || raw.eq_ignore_ascii_case("N/A") {
        return Some(None);
    }
    raw.parse().ok().map(Some)
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_devices() {
        let out = "NVIDIA GeForce RTX 3080, 1024, 10240, 37, 61\nTesla T4, 512, 15360, 0, 40\n";
        let gpus = parse_query_output(out);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 3080");
        assert_eq!(gpus[0].memory_used_gb, Some(1.0));
        assert_eq!(gpus[0].memory_total_gb, Some(10.0));
        assert_eq!(gpus[0].load_percent, Some(37.0));
        assert_eq!(gpus[1].temperature_c, Some(40.0));
    }

    #[test]
    fn not_available_fields_keep_the_device() {
        let out = "NVIDIA A100-SXM4-40GB, 0, 40960, 0, [N/A]\nGPU 0, [N/A], 8192, [Not Supported], 50\n";
        let gpus = parse_query_output(out);
        assert_eq!(gpus.len(), 2);

        assert_eq!(gpus[0].name, "NVIDIA A100-SXM4-40GB");
        assert_eq!(gpus[0].memory_total_gb, Some(40.0));
        assert_eq!(gpus[0].temperature_c, None);

        assert_eq!(gpus[1].memory_used_gb, None);
        assert_eq!(gpus[1].memory_total_gb, Some(8.0));
        assert_eq!(gpus[1].load_percent, None);
        assert_eq!(gpus[1].temperature_c, Some(50.0));
    }

    #[test]
    fn skips_malformed_rows() {
        let out = "broken line\nGPU 1, lots, 8192, 10, 50\n, 1, 2, 3, 4\nA100, 100, 40960, 99, 70\n";
        let gpus = parse_query_output(out);
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].name, "A100");
    }

    #[test]
    fn missing_tool_means_no_gpus() {
        let probe = GpuProbe::new("taskpulse-no-such-gpu-tool", Duration::from_millis(200));
        let gpus = probe.query().expect("missing tool is not a failure");
        assert!(gpus.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_unavailable() {
        let probe = GpuProbe::new("false", Duration::from_secs(2));
        assert!(matches!(probe.query(), Err(MetricError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_stall_the_child() {
        let mut command = Command::new("sh");
        command.args(["-c", "head -c 300000 /dev/zero | tr '\\0' x"]);
        let output = run_bounded(&mut command, Duration::from_secs(5))
            .unwrap()
            .expect("finished before the timeout");
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 300_000);
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_is_killed_at_timeout() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let output = run_bounded(&mut command, Duration::from_millis(100)).unwrap();
        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
