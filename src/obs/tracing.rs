// self
use crate::{_prelude::*, store::CacheKey};
#[cfg(feature = "tracing")]
use crate::obs::{EventSink, RefreshEvent, RefreshOutcome};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedAcquire<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAcquire<F> = F;

/// Span builder wrapping one acquisition; a no-op without the `tracing` feature.
#[derive(Clone, Debug)]
pub struct RefreshSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RefreshSpan {
	/// Creates a new span tagged with the cache key and call stage.
	pub fn new(key: &CacheKey, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("token_keeper.acquire", key = %key, stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (key, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAcquire<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Sink that forwards events as structured `tracing` events.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;
#[cfg(feature = "tracing")]
impl EventSink for TracingSink {
	fn publish(&self, event: &RefreshEvent) {
		let latency_ms = event.latency.map(|latency| latency.whole_milliseconds());
		let detail = event.detail.as_deref().unwrap_or_default();

		match event.outcome {
			RefreshOutcome::CacheHit | RefreshOutcome::Refreshed => tracing::info!(
				key = %event.key,
				outcome = event.outcome.as_str(),
				latency_ms,
				"token acquisition",
			),
			RefreshOutcome::AcquireFailed | RefreshOutcome::StoreWriteFailed => tracing::warn!(
				key = %event.key,
				outcome = event.outcome.as_str(),
				latency_ms,
				detail,
				"token acquisition",
			),
		}
	}
}
