//! Token acquisition seam.
//!
//! [`TokenSource`] is the manager's only dependency on a token-issuing backend. The
//! production implementation lives in [`client_credentials`]; tests substitute scripted
//! sources.

pub mod client_credentials;
pub use client_credentials::*;

// self
use crate::{_prelude::*, auth::{ScopeSet, Token}, error::AcquireError};

/// Boxed future returned by [`TokenSource::exchange`].
pub type SourceFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Token, AcquireError>> + 'a + Send>>;

/// Backend capable of exchanging credentials for a bearer token.
///
/// Implementations must tolerate concurrent calls for different scope sets; the manager
/// serializes calls that share a cache key. A failure must leave no partial state behind.
pub trait TokenSource: Send + Sync {
	/// Performs one token exchange for the given scopes.
	fn exchange<'a>(&'a self, scope: &'a ScopeSet) -> SourceFuture<'a>;
}

#[cfg(test)]
pub(crate) mod testing {
	//! Scripted sources driving the manager's unit tests.

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration as StdDuration,
	};
	// self
	use super::*;
	use crate::clock::Clock;

	/// One scripted exchange outcome.
	#[derive(Clone, Debug)]
	pub enum ScriptedStep {
		/// Issue a token valid for the given number of seconds.
		Issue { ttl_secs: i64 },
		/// Fail the exchange with a rejection carrying this reason.
		Fail { reason: &'static str },
	}

	/// Token source that replays a fixed plan and counts exchanges.
	pub struct ScriptedSource {
		plan: Mutex<VecDeque<ScriptedStep>>,
		calls: AtomicUsize,
		clock: Arc<dyn Clock>,
		delay: Option<StdDuration>,
	}
	impl ScriptedSource {
		pub fn new(clock: Arc<dyn Clock>, plan: impl IntoIterator<Item = ScriptedStep>) -> Self {
			Self {
				plan: Mutex::new(plan.into_iter().collect()),
				calls: AtomicUsize::new(0),
				clock,
				delay: None,
			}
		}

		/// Makes every exchange pause first, so concurrent callers can pile up behind it.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = Some(delay);

			self
		}

		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenSource for ScriptedSource {
		fn exchange<'a>(&'a self, scope: &'a ScopeSet) -> SourceFuture<'a> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				if let Some(delay) = self.delay {
					tokio::time::sleep(delay).await;
				}

				let step = self
					.plan
					.lock()
					.pop_front()
					.unwrap_or(ScriptedStep::Issue { ttl_secs: 3_600 });

				match step {
					ScriptedStep::Issue { ttl_secs } => Token::builder(scope.clone())
						.access_token(format!("token-{call}"))
						.issued_at(self.clock.now())
						.expires_in(Duration::seconds(ttl_secs))
						.build()
						.map_err(|err| AcquireError::Malformed { reason: err.to_string() }),
					ScriptedStep::Fail { reason } =>
						Err(AcquireError::Rejected { reason: reason.into() }),
				}
			})
		}
	}
}
