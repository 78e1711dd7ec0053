use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Control messages accepted by every long-running loop of the scheduler.
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Stop the loop, acknowledging with `true` once it has stopped cleanly
    Terminate { ack_chan: oneshot::Sender<bool> },
}

/// Cadence of a periodic loop.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Time between the starts of two cycles
    pub throttle: Duration,
    /// Cycles slower than this are logged as warnings
    pub warn_threshold: Duration,
}

impl LoopTiming {
    pub fn new(throttle: Duration, warn_threshold: Duration) -> Self {
        Self {
            throttle,
            warn_threshold,
        }
    }

    /// Logs how long a cycle took and returns how long to sleep before the next.
    pub(crate) fn finish_cycle(&self, component: &str, elapsed: Duration) -> Duration {
        if elapsed > self.warn_threshold {
            warn!(
                "{}: Cycle took {} ms, over the {} ms warning threshold",
                component,
                elapsed.as_millis(),
                self.warn_threshold.as_millis()
            );
        } else {
            debug!("{}: Cycle took {} ms", component, elapsed.as_millis());
        }

        self.throttle.saturating_sub(elapsed)
    }
}
