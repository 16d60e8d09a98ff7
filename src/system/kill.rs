use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerminateError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("failed to send {signal} to PID {pid} (permission denied?)")]
    Failed { pid: u32, signal: &'static str },

    #[error("no pinned process")]
    NoPinnedProcess,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateSignal {
    /// Polite request (SIGTERM on Unix).
    Term,
    /// Immediate kill (SIGKILL on Unix).
    Kill,
}

impl TerminateSignal {
    fn as_sysinfo(self) -> Signal {
        match self {
            TerminateSignal::Term => Signal::Term,
            TerminateSignal::Kill => Signal::Kill,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TerminateSignal::Term => "SIGTERM",
            TerminateSignal::Kill => "SIGKILL",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminated {
    pub pid: u32,
    pub signal: &'static str,
}

/// Look up `pid` freshly and deliver `signal` to it.
pub fn terminate_process(pid: u32, signal: TerminateSignal) -> Result<Terminated, TerminateError> {
    let sys_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    let pids = [sys_pid];
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&pids),
        true,
        ProcessRefreshKind::nothing(),
    );
    signal_process(&sys, pid, signal)
}

pub fn signal_process(
    sys: &System,
    pid: u32,
    signal: TerminateSignal,
) -> Result<Terminated, TerminateError> {
    let process = sys
        .process(Pid::from_u32(pid))
        .ok_or(TerminateError::NotFound(pid))?;
    let signal_name = signal.name();

    let delivered = match process.kill_with(signal.as_sysinfo()) {
        Some(delivered) => delivered,
        // Signal not supported on this platform, fall back to kill()
        None => process.kill(),
    };

    if delivered {
        tracing::info!(pid, signal = signal_name, "signal delivered");
        Ok(Terminated {
            pid,
            signal: signal_name,
        })
    } else {
        tracing::warn!(pid, signal = signal_name, "signal delivery failed");
        Err(TerminateError::Failed {
            pid,
            signal: signal_name,
        })
    }
}
