use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::adapters::ping::{PingReading, ReachabilityStrategy, default_strategy};
use crate::domain::observation::Observation;

/// Grace period on top of the ping timeout before the child is killed.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Runs one reachability check per call through a [`ReachabilityStrategy`].
pub struct Prober {
    strategy: Box<dyn ReachabilityStrategy>,
    timeout: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(default_strategy())
    }
}

impl Prober {
    pub fn new(strategy: Box<dyn ReachabilityStrategy>) -> Self {
        Self {
            strategy,
            timeout: Duration::from_secs(2),
        }
    }

    /// Bound on how long the external command may run, grace period excluded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Probe `target` once.
    ///
    /// Never fails: a missing tool, a non-zero exit or an unparseable reply
    /// all yield an unreachable observation stamped with the start instant.
    #[instrument(skip(self), fields(strategy = self.strategy.name()))]
    pub async fn probe(&self, target: &str) -> Observation {
        let started = Utc::now();
        let output = match self.run(target).await {
            Some(out) => out,
            None => return Observation::unreachable(started, target),
        };
        match self.strategy.parse(&output) {
            PingReading::Latency(ms) => Observation::reachable(started, target, ms),
            PingReading::ReceivedUnmeasured => Observation::reachable(started, target, 0),
            PingReading::NoReply => Observation::unreachable(started, target),
        }
    }

    /// Combined stdout and stderr of a successful run, `None` otherwise.
    async fn run(&self, target: &str) -> Option<String> {
        let mut cmd = Command::new(self.strategy.program());
        cmd.args(self.strategy.args(target))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let res = tokio::time::timeout(self.timeout + KILL_GRACE, cmd.output()).await;
        let output = match res {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = self.strategy.program(), error = %e, "failed to run probe command");
                return None;
            }
            Err(_) => {
                debug!("probe command timed out");
                return None;
            }
        };
        if !output.status.success() {
            debug!(status = %output.status, "probe command exited with failure");
            return None;
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text)
    }
}
