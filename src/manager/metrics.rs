//! In-process counters for token acquisition.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Acquisition counters exposed by the manager.
///
/// All counters are monotonic except `consecutive_failures`, which resets whenever an
/// exchange succeeds.
#[derive(Debug, Default)]
pub struct AcquireMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
	store_write_failures: AtomicU64,
	consecutive_failures: AtomicU64,
}
impl AcquireMetrics {
	/// Total `get_token` calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::SeqCst)
	}

	/// Calls served from the cache without an exchange.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::SeqCst)
	}

	/// Successful exchanges.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::SeqCst)
	}

	/// Failed exchanges.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::SeqCst)
	}

	/// Cache writes that failed after a successful exchange.
	pub fn store_write_failures(&self) -> u64 {
		self.store_write_failures.load(Ordering::SeqCst)
	}

	/// Exchange failures since the last success.
	pub fn consecutive_failures(&self) -> u64 {
		self.consecutive_failures.load(Ordering::SeqCst)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::SeqCst);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::SeqCst);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::SeqCst);
		self.consecutive_failures.store(0, Ordering::SeqCst);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::SeqCst);
		self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
	}

	pub(crate) fn record_store_write_failure(&self) {
		self.store_write_failures.fetch_add(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn consecutive_failures_reset_on_success() {
		let metrics = AcquireMetrics::default();

		metrics.record_failure();
		metrics.record_failure();

		assert_eq!(metrics.failures(), 2);
		assert_eq!(metrics.consecutive_failures(), 2);

		metrics.record_refresh();

		assert_eq!(metrics.failures(), 2);
		assert_eq!(metrics.consecutive_failures(), 0);
		assert_eq!(metrics.refreshes(), 1);
	}
}
