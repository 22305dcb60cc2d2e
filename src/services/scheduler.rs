//! Fixed-interval probe loop feeding observations to a sink.
//!
//! The loop probes once immediately, then once per interval until a stop is
//! requested. Stop is cooperative: it is observed at the wait point only, so
//! an in-flight probe and its dispatch always run to completion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, instrument};

use crate::domain::observation::Observation;
use crate::error::UplogError;
use crate::services::probe::Prober;

/// Target used when none is configured.
pub const DEFAULT_TARGET: &str = "8.8.8.8";
/// Interval used when the configured one is shorter than a second.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Receiver of every observation the scheduler produces.
pub trait ObservationSink: Send + Sync {
    fn record(&self, observation: &Observation) -> Result<(), UplogError>;
}

/// Adapts a closure into an [`ObservationSink`].
pub struct FnSink<F>(pub F);

impl<F> ObservationSink for FnSink<F>
where
    F: Fn(&Observation) -> Result<(), UplogError> + Send + Sync,
{
    fn record(&self, observation: &Observation) -> Result<(), UplogError> {
        (self.0)(observation)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub target: String,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Empty targets fall back to [`DEFAULT_TARGET`], sub-second intervals to [`DEFAULT_INTERVAL`].
    pub fn normalized(mut self) -> Self {
        if self.target.trim().is_empty() {
            self.target = DEFAULT_TARGET.to_string();
        }
        if self.interval < Duration::from_secs(1) {
            self.interval = DEFAULT_INTERVAL;
        }
        self
    }
}

/// Lifecycle of a [`Scheduler`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

pub struct Scheduler {
    config: SchedulerConfig,
    prober: Prober,
    sink: Arc<dyn ObservationSink>,
    state: Mutex<SchedulerState>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, prober: Prober, sink: Arc<dyn ObservationSink>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config: config.normalized(),
            prober,
            sink,
            state: Mutex::new(SchedulerState::Idle),
            stop_tx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Run the probe loop until [`stop`](Self::stop) is called.
    ///
    /// Spawn this on its own task; it only returns once stopped. Fails
    /// immediately if the scheduler already ran or was stopped before starting.
    #[instrument(skip(self), fields(host = %self.config.target, interval = ?self.config.interval))]
    pub async fn start(&self) -> Result<(), UplogError> {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                return Err(UplogError::Scheduler(format!(
                    "cannot start a scheduler in state {:?}",
                    *state
                )));
            }
            *state = SchedulerState::Running;
        }
        let mut stop_rx = self.stop_tx.subscribe();
        info!("monitoring started");

        self.tick().await;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        ticker.tick().await;

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        info!("monitoring stopped");
        Ok(())
    }

    /// Ask the running loop to exit at its next wait point.
    ///
    /// Safe to call from another task while [`start`](Self::start) is waiting.
    /// Calling it on an idle scheduler makes a later `start` fail.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == SchedulerState::Idle {
            *state = SchedulerState::Stopped;
        }
        self.stop_tx.send_replace(true);
    }

    async fn tick(&self) {
        let observation = self.prober.probe(&self.config.target).await;
        self.dispatch(observation).await;
    }

    async fn dispatch(&self, observation: Observation) {
        let sink = Arc::clone(&self.sink);
        let res = tokio::task::spawn_blocking(move || sink.record(&observation)).await;
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "failed to store connection status"),
            Err(e) => error!(error = %e, "observation sink panicked"),
        }
    }
}
