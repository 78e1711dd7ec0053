use std::time::Duration;

use crate::supervisor::LoopTiming;

pub mod default;

pub use default::ReconciliationDispatcher;

pub const DEFAULT_THROTTLE_MS: u64 = 5000;
pub const DEFAULT_WARN_THRESHOLD_MS: u64 = 500;

pub struct DispatcherConfig {
    pub timing: LoopTiming,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timing: LoopTiming::new(
                Duration::from_millis(DEFAULT_THROTTLE_MS),
                Duration::from_millis(DEFAULT_WARN_THRESHOLD_MS),
            ),
        }
    }
}

/// What a single dispatcher cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub timed_out: Vec<String>,
    pub routing_failures: usize,
    pub reconciled: Vec<String>,
}
