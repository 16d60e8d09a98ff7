use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::publisher::Publisher;
use crate::system::{MetricSource, PinTracker, Snapshot, SnapshotBuilder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("sampler is already running")]
    AlreadyRunning,

    #[error("sampler has been stopped")]
    Stopped,

    #[error("no tokio runtime available to drive the sampler")]
    NoRuntime,
}

/// Everything one cycle touches: adapters, builder and pin tracker.
pub struct Pipeline<S> {
    source: S,
    builder: SnapshotBuilder,
    tracker: PinTracker,
}

impl<S: MetricSource> Pipeline<S> {
    pub fn new(source: S, builder: SnapshotBuilder, tracker: PinTracker) -> Self {
        Pipeline {
            source,
            builder,
            tracker,
        }
    }

    /// Collect, build and reconcile one snapshot.
    pub fn run_cycle(&mut self) -> Snapshot {
        let mut snapshot = self.builder.build(&mut self.source);
        self.tracker.reconcile(&mut snapshot, &mut self.source);
        snapshot
    }
}

/// Drives [`Pipeline`] cycles at a fixed interval.
///
/// Cycles run one at a time on the blocking pool; the loop only waits
/// between cycles. Stopping is cooperative: the flag is checked before each
/// cycle and cuts the inter-cycle wait short, but a cycle already running is
/// finished and published.
pub struct Scheduler<S> {
    state: SamplerState,
    interval: Duration,
    pipeline: Option<Pipeline<S>>,
    publisher: Arc<Publisher>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<S: MetricSource> Scheduler<S> {
    pub fn new(pipeline: Pipeline<S>, publisher: Arc<Publisher>, interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Scheduler {
            state: SamplerState::Idle,
            interval,
            pipeline: Some(pipeline),
            publisher,
            stop_tx,
            task: None,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self) -> Result<(), SamplerError> {
        match self.state {
            SamplerState::Running => return Err(SamplerError::AlreadyRunning),
            SamplerState::Stopped => return Err(SamplerError::Stopped),
            SamplerState::Idle => {}
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SamplerError::NoRuntime)?;
        let pipeline = self.pipeline.take().ok_or(SamplerError::Stopped)?;

        let task = runtime.spawn(sampling_loop(
            pipeline,
            Arc::clone(&self.publisher),
            self.interval,
            self.stop_tx.subscribe(),
        ));
        self.task = Some(task);
        self.state = SamplerState::Running;
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "sampler started");
        Ok(())
    }

    /// Request a stop. Takes effect before the next cycle.
    pub fn stop(&mut self) {
        if self.state == SamplerState::Stopped {
            return;
        }
        self.stop_tx.send_replace(true);
        self.pipeline = None;
        self.state = SamplerState::Stopped;
        tracing::info!("sampler stop requested");
    }

    /// Stop and wait for the in-flight cycle (if any) to be published.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::error!(error = %err, "sampling loop ended abnormally");
        }
    }
}

impl<S> Drop for Scheduler<S> {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

async fn sampling_loop<S: MetricSource>(
    mut pipeline: Pipeline<S>,
    publisher: Arc<Publisher>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow_and_update() {
            break;
        }

        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| pipeline.run_cycle()));
            (pipeline, outcome)
        })
        .await;

        let outcome = match joined {
            Ok((returned, outcome)) => {
                pipeline = returned;
                outcome
            }
            Err(err) => {
                tracing::error!(error = %err, "sampling worker lost, stopping");
                break;
            }
        };

        match outcome {
            Ok(snapshot) => {
                tracing::debug!(
                    cycle = snapshot.cycle,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cycle complete"
                );
                publisher.publish(Arc::new(snapshot));
            }
            Err(panic) => {
                tracing::error!(
                    reason = panic_message(panic.as_ref()),
                    "sampling cycle failed, skipping"
                );
            }
        }

        if interval.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("sampler stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
