pub mod config;
pub mod format;
pub mod logging;
pub mod monitor;
pub mod report;
pub mod system;

pub use monitor::{Monitor, SamplerSettings, SamplerState, SubscriptionId};
pub use system::{Snapshot, TerminateError};
