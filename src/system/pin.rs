//! Pinned-process tracking across cycles.
//!
//! The tracker is the only writer of the pin. Commands from consumers are
//! queued on a channel and applied at the start of each reconciliation, so a
//! command never lands halfway through one.

use tokio::sync::{mpsc, watch};

use super::snapshot::Snapshot;
use super::source::MetricSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinCommand {
    Pin(u32),
    TogglePin(u32),
    Clear,
}

pub struct PinTracker {
    pinned_pid: Option<u32>,
    process_limit: usize,
    commands: mpsc::UnboundedReceiver<PinCommand>,
    published: watch::Sender<Option<u32>>,
}

/// Consumer-side handle for queueing pin commands.
#[derive(Clone, Debug)]
pub struct PinHandle {
    commands: mpsc::UnboundedSender<PinCommand>,
    state: watch::Receiver<Option<u32>>,
}

impl PinHandle {
    pub fn pin(&self, pid: u32) {
        self.send(PinCommand::Pin(pid));
    }

    pub fn toggle_pin(&self, pid: u32) {
        self.send(PinCommand::TogglePin(pid));
    }

    pub fn clear_pin(&self) {
        self.send(PinCommand::Clear);
    }

    /// Pin state as of the last completed reconciliation.
    pub fn pinned_pid(&self) -> Option<u32> {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Option<u32>> {
        self.state.clone()
    }

    fn send(&self, command: PinCommand) {
        // A closed channel means the tracker is gone; nothing left to pin.
        if self.commands.send(command).is_err() {
            tracing::debug!(?command, "pin command dropped, tracker stopped");
        }
    }
}

impl PinTracker {
    pub fn new(process_limit: usize) -> (Self, PinHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(None);
        let tracker = PinTracker {
            pinned_pid: None,
            process_limit,
            commands: rx,
            published: state_tx,
        };
        let handle = PinHandle {
            commands: tx,
            state: state_rx,
        };
        (tracker, handle)
    }

    pub fn pinned_pid(&self) -> Option<u32> {
        self.pinned_pid
    }

    pub fn apply(&mut self, command: PinCommand) {
        self.pinned_pid = match command {
            PinCommand::Pin(pid) => Some(pid),
            PinCommand::TogglePin(pid) if self.pinned_pid == Some(pid) => None,
            PinCommand::TogglePin(pid) => Some(pid),
            PinCommand::Clear => None,
        };
    }

    /// Apply queued commands, then re-resolve the pin against the snapshot's
    /// process list. The pinned entry ends up at the front with fresh stats
    /// when `probe` can supply them; a pin whose process is gone is cleared.
    pub fn reconcile<S: MetricSource + ?Sized>(&mut self, snapshot: &mut Snapshot, probe: &mut S) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        if let Some(pid) = self.pinned_pid {
            let processes = &mut snapshot.processes;
            match processes.iter().position(|p| p.pid == pid) {
                Some(index) => {
                    let mut entry = processes.remove(index);
                    if let Some(fresh) = probe.probe_process(pid) {
                        entry.cpu_percent = fresh.cpu_percent;
                        entry.resident_memory_bytes = fresh.resident_memory_bytes;
                    }
                    processes.insert(0, entry);
                }
                None => match probe.probe_process(pid) {
                    // Alive but outside the ranked cut.
                    Some(fresh) => {
                        processes.insert(0, fresh);
                        processes.truncate(self.process_limit.max(1));
                    }
                    None => {
                        tracing::debug!(pid, "pinned process exited, clearing pin");
                        self.pinned_pid = None;
                    }
                },
            }
        }

        snapshot.pinned_pid = self.pinned_pid;
        self.published.send_if_modified(|current| {
            let changed = *current != self.pinned_pid;
            *current = self.pinned_pid;
            changed
        });
    }
}
