//! Exponential backoff schedule used between failing background refresh ticks.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Backoff tuning for the background refresh loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
	/// Delay applied after the first failure.
	pub initial_delay: StdDuration,
	/// Upper bound no delay exceeds.
	pub max_delay: StdDuration,
	/// Multiplier applied after each consecutive failure.
	pub multiplier: u32,
}
impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial_delay: StdDuration::from_millis(100),
			max_delay: StdDuration::from_secs(15),
			multiplier: 2,
		}
	}
}

/// Mutable backoff state tracking consecutive failures.
#[derive(Clone, Debug)]
pub struct BackoffState {
	config: BackoffConfig,
	next_delay: Option<StdDuration>,
}
impl BackoffState {
	/// Creates a fresh state with no recorded failures.
	pub fn new(config: BackoffConfig) -> Self {
		Self { config, next_delay: None }
	}

	/// Records a success, resetting the schedule.
	pub fn succeeded(&mut self) {
		self.next_delay = None;
	}

	/// Records a failure and returns the delay to wait before the next attempt.
	pub fn failed(&mut self) -> StdDuration {
		let delay = self.next_delay.unwrap_or(self.config.initial_delay).min(self.config.max_delay);

		self.next_delay = Some(delay.saturating_mul(self.config.multiplier));

		delay
	}
}
