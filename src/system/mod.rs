pub mod builder;
pub mod collector;
pub mod gpu;
pub mod kill;
pub mod pin;
mod platform;
pub mod process;
pub mod snapshot;
pub mod source;

pub use builder::SnapshotBuilder;
pub use collector::SysinfoSource;
pub use kill::{TerminateError, TerminateSignal, Terminated};
pub use pin::{PinCommand, PinHandle, PinTracker};
pub use process::ProcessEntry;
pub use snapshot::{CpuInfo, DiskInfo, GpuInfo, InterfaceInfo, MemoryInfo, Snapshot};
pub use source::{MetricError, MetricKind, MetricResult, MetricSource};
