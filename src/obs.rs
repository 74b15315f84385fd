//! Optional observability helpers for token acquisition.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_keeper.acquire` with `key` and
//!   `stage` fields, and to use [`TracingSink`] as an event sink.
//! - Enable `metrics` to increment the `token_keeper_acquire_total` counter for every
//!   acquisition outcome, labeled by `outcome`.
//!
//! Presentation stays out of the core: sinks receive structured [`RefreshEvent`] values
//! and format them however they like.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, store::CacheKey};

/// Outcome labels recorded for each acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
	/// A fresh-enough cached token was served without contacting the source.
	CacheHit,
	/// A new token was exchanged and cached.
	Refreshed,
	/// The exchange failed; any previously cached token is untouched.
	AcquireFailed,
	/// The exchange succeeded but the cache write failed; the token was still served.
	StoreWriteFailed,
}
impl RefreshOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshOutcome::CacheHit => "cache_hit",
			RefreshOutcome::Refreshed => "refreshed",
			RefreshOutcome::AcquireFailed => "acquire_failed",
			RefreshOutcome::StoreWriteFailed => "store_write_failed",
		}
	}
}
impl Display for RefreshOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Structured event published to the configured [`EventSink`] after each acquisition.
#[derive(Clone, Debug)]
pub struct RefreshEvent {
	/// Cache key the acquisition was made for.
	pub key: CacheKey,
	/// What happened.
	pub outcome: RefreshOutcome,
	/// Instant the event was recorded.
	pub at: OffsetDateTime,
	/// Wall time the acquisition took; absent for cache hits.
	pub latency: Option<Duration>,
	/// Free-form detail, typically the error display for failures.
	pub detail: Option<String>,
}

/// Observer receiving one event per acquisition.
///
/// Implementations must be cheap and non-blocking; the manager publishes events inline
/// on the acquisition path.
pub trait EventSink
where
	Self: Send + Sync,
{
	/// Handles a single event.
	fn publish(&self, event: &RefreshEvent);
}

/// Default sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;
impl EventSink for NullSink {
	fn publish(&self, _event: &RefreshEvent) {}
}
