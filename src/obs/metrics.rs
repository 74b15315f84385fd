// self
use crate::obs::RefreshOutcome;

/// Records an acquisition outcome via the global metrics recorder (when enabled).
pub fn record_acquire_outcome(outcome: RefreshOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("token_keeper_acquire_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_acquire_outcome_noop_without_metrics() {
		record_acquire_outcome(RefreshOutcome::AcquireFailed);
	}
}
