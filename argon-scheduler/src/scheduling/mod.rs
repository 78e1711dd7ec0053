use std::time::Duration;

use crate::supervisor::LoopTiming;

pub mod default;

pub use default::TaskLaunchService;

pub const DEFAULT_THROTTLE_MS: u64 = 1000;
pub const DEFAULT_WARN_THRESHOLD_MS: u64 = 500;

pub struct LaunchServiceConfig {
    pub timing: LoopTiming,
}

impl Default for LaunchServiceConfig {
    fn default() -> Self {
        Self {
            timing: LoopTiming::new(
                Duration::from_millis(DEFAULT_THROTTLE_MS),
                Duration::from_millis(DEFAULT_WARN_THRESHOLD_MS),
            ),
        }
    }
}
