//! The sampling engine as seen from a consumer: lifecycle, subscriptions,
//! pin commands and process termination.

pub mod publisher;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::system::gpu::GpuProbe;
use crate::system::kill::{TerminateSignal, Terminated, terminate_process};
use crate::system::process::DEFAULT_PROCESS_LIMIT;
use crate::system::{
    MetricSource, PinHandle, PinTracker, Snapshot, SnapshotBuilder, SysinfoSource, TerminateError,
};

pub use publisher::{Publisher, SubscriptionId};
pub use scheduler::{Pipeline, SamplerError, SamplerState, Scheduler};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3500);

#[derive(Clone, Debug)]
pub struct SamplerSettings {
    pub interval: Duration,
    pub process_limit: usize,
    /// `None` turns GPU probing off.
    pub gpu: Option<GpuProbe>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings {
            interval: DEFAULT_INTERVAL,
            process_limit: DEFAULT_PROCESS_LIMIT,
            gpu: Some(GpuProbe::default()),
        }
    }
}

impl SamplerSettings {
    pub fn from_config(config: &Config) -> Self {
        let gpu = config.gpu.enabled.then(|| {
            GpuProbe::new(
                config.gpu.command.clone(),
                Duration::from_millis(config.gpu.timeout_ms),
            )
        });
        SamplerSettings {
            interval: Duration::from_millis(config.sampler.interval_ms),
            process_limit: config.sampler.process_limit,
            gpu,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_process_limit(mut self, limit: usize) -> Self {
        self.process_limit = limit;
        self
    }
}

pub struct Monitor<S: MetricSource = SysinfoSource> {
    scheduler: Scheduler<S>,
    publisher: Arc<Publisher>,
    pins: PinHandle,
}

impl Monitor<SysinfoSource> {
    pub fn new(settings: SamplerSettings) -> Self {
        let source = SysinfoSource::new(settings.gpu.clone());
        Self::with_source(source, &settings)
    }
}

impl<S: MetricSource> Monitor<S> {
    pub fn with_source(source: S, settings: &SamplerSettings) -> Self {
        let (tracker, pins) = PinTracker::new(settings.process_limit);
        let builder = SnapshotBuilder::new(settings.process_limit);
        let publisher = Arc::new(Publisher::new());
        let scheduler = Scheduler::new(
            Pipeline::new(source, builder, tracker),
            Arc::clone(&publisher),
            settings.interval,
        );
        Monitor {
            scheduler,
            publisher,
            pins,
        }
    }

    pub fn start(&mut self) -> Result<(), SamplerError> {
        self.scheduler.start()
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub async fn shutdown(&mut self) {
        self.scheduler.shutdown().await;
    }

    pub fn state(&self) -> SamplerState {
        self.scheduler.state()
    }

    pub fn subscribe<F>(&self, consumer: F) -> SubscriptionId
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        self.publisher.subscribe(consumer)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Arc<Snapshot>>) {
        self.publisher.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Pin `pid`. It is checked against the process list on the next cycle.
    pub fn pin(&self, pid: u32) {
        self.pins.pin(pid);
    }

    pub fn toggle_pin(&self, pid: u32) {
        self.pins.toggle_pin(pid);
    }

    pub fn clear_pin(&self) {
        self.pins.clear_pin();
    }

    /// Pin as of the last completed cycle.
    pub fn pinned_pid(&self) -> Option<u32> {
        self.pins.pinned_pid()
    }

    pub fn watch_pin(&self) -> watch::Receiver<Option<u32>> {
        self.pins.watch()
    }

    /// Ask `pid` to exit (SIGTERM on Unix). The pin, if it pointed at `pid`,
    /// clears itself on the next cycle once the process is gone.
    pub fn terminate(&self, pid: u32) -> Result<Terminated, TerminateError> {
        terminate_process(pid, TerminateSignal::Term)
    }

    pub fn force_terminate(&self, pid: u32) -> Result<Terminated, TerminateError> {
        terminate_process(pid, TerminateSignal::Kill)
    }

    /// Terminate the pinned process and drop the pin.
    ///
    /// Acts on [`Monitor::pinned_pid`], the pin as of the last completed
    /// cycle. A `pin` issued since then is not yet visible here, so this
    /// returns [`TerminateError::NoPinnedProcess`] until a cycle has applied
    /// it; wait on [`Monitor::watch_pin`] when that matters.
    pub fn terminate_pinned(&self) -> Result<Terminated, TerminateError> {
        let pid = self.pinned_pid().ok_or(TerminateError::NoPinnedProcess)?;
        let terminated = self.terminate(pid)?;
        self.pins.clear_pin();
        Ok(terminated)
    }
}
