//! Injectable wall-clock abstraction so freshness decisions stay deterministic in tests.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
	/// Current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Hand-driven clock for deterministic tests.
#[cfg(any(test, feature = "test"))]
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
}
#[cfg(any(test, feature = "test"))]
impl ManualClock {
	/// Creates a clock pinned to the given instant.
	pub fn starting_at(instant: OffsetDateTime) -> Self {
		Self { now: Mutex::new(instant) }
	}

	/// Moves the clock forward.
	pub fn advance(&self, delta: Duration) {
		*self.now.lock() += delta;
	}

	/// Pins the clock to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.now.lock() = instant;
	}
}
#[cfg(any(test, feature = "test"))]
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock()
	}
}
