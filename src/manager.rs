//! The refresh manager: cached, single-flight token acquisition.
//!
//! [`RefreshManager::get_token`] serves a cached token while it stays fresh, and
//! otherwise performs exactly one exchange per cache key no matter how many callers
//! arrive concurrently. Callers queued behind an in-flight exchange receive the same
//! outcome the exchange produced, success or failure, without contacting the source
//! themselves.

pub mod background;
pub mod metrics;

pub use background::*;
pub use metrics::*;

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Instant,
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ScopeValidationError, Token},
	clock::{Clock, SystemClock},
	credentials::CredentialIdentity,
	error::{AcquireError, ConfigError},
	obs::{self, EventSink, NullSink, RefreshEvent, RefreshOutcome, RefreshSpan},
	source::TokenSource,
	store::{CacheKey, CacheStore, MemoryStore},
};

/// Controls how early a token is refreshed ahead of its expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
	/// Tokens whose remaining lifetime is at most this margin count as stale.
	pub skew_margin: Duration,
}
impl FreshnessPolicy {
	/// Default skew margin.
	pub const DEFAULT_SKEW_MARGIN: Duration = Duration::minutes(2);
}
impl Default for FreshnessPolicy {
	fn default() -> Self {
		Self { skew_margin: Self::DEFAULT_SKEW_MARGIN }
	}
}

/// Parameters for a single acquisition.
#[derive(Clone, Debug)]
pub struct TokenRequest {
	/// Scopes the token must cover.
	pub scope: ScopeSet,
	/// Forces an exchange even when a fresh token is cached.
	pub force: bool,
	/// Per-request override of the policy's skew margin.
	pub skew_override: Option<Duration>,
}
impl TokenRequest {
	/// Creates a request for the given scopes.
	pub fn new(scope: ScopeSet) -> Self {
		Self { scope, force: false, skew_override: None }
	}

	/// Forces the manager to bypass cache checks.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the skew margin for this request only.
	pub fn with_skew(mut self, skew: Duration) -> Self {
		self.skew_override = Some(if skew.is_negative() { Duration::ZERO } else { skew });

		self
	}
}

type FlightOutcome = Result<Token, Arc<AcquireError>>;

/// Per-key single-flight state.
///
/// The epoch counts resolved flights; a caller that saw the epoch move while waiting on
/// the gate consumes the shared outcome instead of starting its own exchange.
#[derive(Default)]
struct Flight {
	gate: AsyncMutex<()>,
	epoch: AtomicU64,
	last: Mutex<Option<FlightOutcome>>,
}

/// Acquires, caches, and refreshes bearer tokens for one credential.
pub struct RefreshManager {
	identity: CredentialIdentity,
	source: Arc<dyn TokenSource>,
	store: Arc<dyn CacheStore>,
	policy: FreshnessPolicy,
	clock: Arc<dyn Clock>,
	sink: Arc<dyn EventSink>,
	metrics: AcquireMetrics,
	flights: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}
impl RefreshManager {
	/// Returns a builder wiring the two mandatory collaborators.
	pub fn builder(
		identity: CredentialIdentity,
		source: Arc<dyn TokenSource>,
	) -> RefreshManagerBuilder {
		RefreshManagerBuilder { identity, source, store: None, policy: None, clock: None, sink: None }
	}

	/// Credential identity the manager keys its cache by.
	pub fn identity(&self) -> &CredentialIdentity {
		&self.identity
	}

	/// Acquisition counters.
	pub fn metrics(&self) -> &AcquireMetrics {
		&self.metrics
	}

	/// Returns a token covering the requested scopes.
	///
	/// Serves the cached token while `now + skew < expires_on`; otherwise performs (or
	/// joins) the single in-flight exchange for the key. A failed exchange leaves the
	/// cache exactly as it was. An empty scope set is rejected without contacting the
	/// source.
	pub async fn get_token(&self, request: TokenRequest) -> Result<Token> {
		if request.scope.is_empty() {
			return Err(ConfigError::InvalidScope(ScopeValidationError::Empty).into());
		}

		let key = CacheKey::new(&self.identity, &request.scope);
		let span = RefreshSpan::new(&key, "get_token");

		span.instrument(self.acquire(key, request)).await
	}

	async fn acquire(&self, key: CacheKey, request: TokenRequest) -> Result<Token> {
		self.metrics.record_attempt();

		let skew = request.skew_override.unwrap_or(self.policy.skew_margin);

		if !request.force
			&& let Some(current) = self.fresh_cached(&key, skew).await?
		{
			return Ok(current);
		}

		let flight = self.flight(&key);
		let epoch_before = flight.epoch.load(Ordering::SeqCst);
		let _gate = flight.gate.lock().await;

		// The flight we queued behind resolved; take its shared outcome.
		if flight.epoch.load(Ordering::SeqCst) != epoch_before
			&& let Some(outcome) = flight.last.lock().clone()
		{
			return outcome.map_err(Error::Acquisition);
		}

		// Gate-holder: someone may have refreshed between our fast path and the lock.
		if !request.force
			&& let Some(current) = self.fresh_cached(&key, skew).await?
		{
			return Ok(current);
		}

		let started = Instant::now();
		let outcome: FlightOutcome =
			self.source.exchange(&request.scope).await.map_err(Arc::new);
		let latency = Duration::try_from(started.elapsed()).unwrap_or(Duration::ZERO);
		let result = match &outcome {
			Ok(token) => {
				self.metrics.record_refresh();

				match self.store.write(&key, token.clone()).await {
					Ok(()) =>
						self.publish(&key, RefreshOutcome::Refreshed, Some(latency), None),
					Err(err) => {
						// The fresh token is still served; only persistence failed.
						self.metrics.record_store_write_failure();
						self.publish(
							&key,
							RefreshOutcome::StoreWriteFailed,
							Some(latency),
							Some(err.to_string()),
						);
					},
				}

				Ok(token.clone())
			},
			Err(shared) => {
				self.metrics.record_failure();
				self.publish(
					&key,
					RefreshOutcome::AcquireFailed,
					Some(latency),
					Some(shared.to_string()),
				);

				Err(Error::Acquisition(shared.clone()))
			},
		};

		*flight.last.lock() = Some(outcome);
		flight.epoch.fetch_add(1, Ordering::SeqCst);

		result
	}

	async fn fresh_cached(&self, key: &CacheKey, skew: Duration) -> Result<Option<Token>> {
		if let Some(current) = self.store.read(key).await?
			&& current.is_fresh_at(self.clock.now(), skew)
		{
			self.metrics.record_cache_hit();
			self.publish(key, RefreshOutcome::CacheHit, None, None);

			return Ok(Some(current.as_cached()));
		}

		Ok(None)
	}

	fn flight(&self, key: &CacheKey) -> Arc<Flight> {
		let mut flights = self.flights.lock();

		flights.entry(key.clone()).or_default().clone()
	}

	fn publish(
		&self,
		key: &CacheKey,
		outcome: RefreshOutcome,
		latency: Option<Duration>,
		detail: Option<String>,
	) {
		obs::record_acquire_outcome(outcome);
		self.sink.publish(&RefreshEvent {
			key: key.clone(),
			outcome,
			at: self.clock.now(),
			latency,
			detail,
		});
	}
}

/// Builder for [`RefreshManager`].
pub struct RefreshManagerBuilder {
	identity: CredentialIdentity,
	source: Arc<dyn TokenSource>,
	store: Option<Arc<dyn CacheStore>>,
	policy: Option<FreshnessPolicy>,
	clock: Option<Arc<dyn Clock>>,
	sink: Option<Arc<dyn EventSink>>,
}
impl RefreshManagerBuilder {
	/// Overrides the cache store (defaults to an in-memory store).
	pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Overrides the freshness policy.
	pub fn policy(mut self, policy: FreshnessPolicy) -> Self {
		self.policy = Some(policy);

		self
	}

	/// Convenience setter for the skew margin only.
	pub fn skew_margin(self, skew_margin: Duration) -> Self {
		self.policy(FreshnessPolicy { skew_margin })
	}

	/// Overrides the clock (defaults to the system clock).
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Overrides the event sink (defaults to a discarding sink).
	pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sink = Some(sink);

		self
	}

	/// Assembles the manager.
	pub fn build(self) -> RefreshManager {
		RefreshManager {
			identity: self.identity,
			source: self.source,
			store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::default())),
			policy: self.policy.unwrap_or_default(),
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
			metrics: AcquireMetrics::default(),
			flights: Mutex::new(HashMap::new()),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		clock::ManualClock,
		credentials::ClientId,
		source::testing::{ScriptedSource, ScriptedStep},
		store::{StoreError, StoreFuture},
	};

	fn identity() -> CredentialIdentity {
		CredentialIdentity {
			authority: Url::parse("https://login.example.com/tenant")
				.expect("Authority fixture should parse."),
			client_id: ClientId::new("client").expect("Client id fixture should be valid."),
		}
	}

	fn scope() -> ScopeSet {
		ScopeSet::new(["https://example.com/.default"]).expect("Scope fixture should be valid.")
	}

	fn clock() -> Arc<ManualClock> {
		Arc::new(ManualClock::starting_at(macros::datetime!(2025-01-01 00:00 UTC)))
	}

	fn manager_with(
		source: Arc<ScriptedSource>,
		clock: Arc<ManualClock>,
	) -> (Arc<RefreshManager>, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let manager = RefreshManager::builder(identity(), source)
			.store(store.clone())
			.clock(clock)
			.build();

		(Arc::new(manager), store)
	}

	#[tokio::test]
	async fn fresh_cached_token_skips_the_exchange() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), [ScriptedStep::Issue {
			ttl_secs: 3_600,
		}]));
		let (manager, _store) = manager_with(source.clone(), clock.clone());
		let first = manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cold-cache acquisition should succeed.");

		assert_eq!(source.calls(), 1);
		assert!(!first.from_cache);

		clock.advance(Duration::seconds(10));

		let second = manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cached acquisition should succeed.");

		assert_eq!(source.calls(), 1, "A fresh cached token must not trigger an exchange.");
		assert!(second.from_cache);
		assert_eq!(second.access_token.expose(), first.access_token.expose());
		assert_eq!(manager.metrics().cache_hits(), 1);
	}

	#[tokio::test]
	async fn empty_scope_set_is_rejected_before_any_exchange() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), []));
		let (manager, _store) = manager_with(source.clone(), clock);
		let err = manager
			.get_token(TokenRequest::new(ScopeSet::default()))
			.await
			.expect_err("An empty scope set must never reach the source.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::InvalidScope(ScopeValidationError::Empty)),
		));
		assert_eq!(source.calls(), 0);
	}

	#[tokio::test]
	async fn skew_margin_triggers_an_early_refresh() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), []));
		let (manager, _store) = manager_with(source.clone(), clock.clone());

		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cold-cache acquisition should succeed.");

		// Remaining lifetime exactly equals the default two-minute margin.
		clock.advance(Duration::seconds(3_600 - 120));

		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Refresh inside the skew margin should succeed.");

		assert_eq!(source.calls(), 2);
		assert_eq!(manager.metrics().refreshes(), 2);
	}

	#[tokio::test]
	async fn failed_refresh_leaves_the_cache_untouched() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), [
			ScriptedStep::Issue { ttl_secs: 3_600 },
			ScriptedStep::Fail { reason: "throttled" },
		]));
		let (manager, store) = manager_with(source.clone(), clock.clone());
		let key = CacheKey::new(&identity(), &scope());

		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cold-cache acquisition should succeed.");
		clock.advance(Duration::seconds(3_595));

		let err = manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect_err("Scripted failure should propagate.");

		assert!(matches!(err, Error::Acquisition(_)));

		let cached = store
			.read(&key)
			.await
			.expect("Store read should succeed.")
			.expect("Cached token must survive a failed refresh.");

		assert_eq!(cached.access_token.expose(), "token-1");
		assert_eq!(manager.metrics().consecutive_failures(), 1);
	}

	#[tokio::test]
	async fn failures_surface_sequentially_then_recover() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), [
			ScriptedStep::Fail { reason: "down" },
			ScriptedStep::Fail { reason: "still down" },
			ScriptedStep::Issue { ttl_secs: 3_600 },
		]));
		let (manager, store) = manager_with(source.clone(), clock.clone());
		let key = CacheKey::new(&identity(), &scope());

		for _ in 0..2 {
			manager
				.get_token(TokenRequest::new(scope()))
				.await
				.expect_err("Scripted failures should propagate.");
		}

		assert_eq!(manager.metrics().consecutive_failures(), 2);

		let token = manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Third attempt should succeed.");

		assert_eq!(source.calls(), 3);
		assert_eq!(manager.metrics().consecutive_failures(), 0);
		assert!(store.read(&key).await.expect("Store read should succeed.").is_some());
		assert_eq!(token.access_token.expose(), "token-3");
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_share_one_exchange() {
		let clock = clock();
		let source = Arc::new(
			ScriptedSource::new(clock.clone(), [ScriptedStep::Issue { ttl_secs: 3_600 }])
				.with_delay(std::time::Duration::from_millis(50)),
		);
		let (manager, _store) = manager_with(source.clone(), clock);
		let (first, second) = tokio::join!(
			manager.get_token(TokenRequest::new(scope())),
			manager.get_token(TokenRequest::new(scope())),
		);
		let first = first.expect("Leader should succeed.");
		let second = second.expect("Waiter should receive the shared token.");

		assert_eq!(source.calls(), 1, "Waiters must not issue a duplicate exchange.");
		assert_eq!(first.access_token.expose(), second.access_token.expose());
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_share_one_failure() {
		let clock = clock();
		let source = Arc::new(
			ScriptedSource::new(clock.clone(), [ScriptedStep::Fail { reason: "rejected" }])
				.with_delay(std::time::Duration::from_millis(50)),
		);
		let (manager, _store) = manager_with(source.clone(), clock);
		let (first, second) = tokio::join!(
			manager.get_token(TokenRequest::new(scope())),
			manager.get_token(TokenRequest::new(scope())),
		);
		let first = first.expect_err("Leader should observe the failure.");
		let second = second.expect_err("Waiter should observe the same failure.");

		assert_eq!(source.calls(), 1);

		match (first, second) {
			(Error::Acquisition(lhs), Error::Acquisition(rhs)) => {
				assert!(Arc::ptr_eq(&lhs, &rhs), "Waiters must share the leader's error value.");
			},
			other => panic!("Both callers should fail with acquisition errors, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn force_refresh_bypasses_a_fresh_cache() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), []));
		let (manager, _store) = manager_with(source.clone(), clock);

		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cold-cache acquisition should succeed.");

		let forced = manager
			.get_token(TokenRequest::new(scope()).force_refresh())
			.await
			.expect("Forced acquisition should succeed.");

		assert_eq!(source.calls(), 2);
		assert_eq!(forced.access_token.expose(), "token-2");
	}

	#[tokio::test]
	async fn skew_override_applies_per_request() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), []));
		let (manager, _store) = manager_with(source.clone(), clock.clone());

		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Cold-cache acquisition should succeed.");
		clock.advance(Duration::seconds(3_000));

		// Ten minutes remain: fresh under the default margin, stale under a longer one.
		manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("Default margin should serve the cached token.");

		assert_eq!(source.calls(), 1);

		manager
			.get_token(TokenRequest::new(scope()).with_skew(Duration::minutes(15)))
			.await
			.expect("Longer margin should trigger a refresh.");

		assert_eq!(source.calls(), 2);
	}

	struct FailingStore;
	impl CacheStore for FailingStore {
		fn read<'a>(&'a self, _key: &'a CacheKey) -> StoreFuture<'a, Option<Token>> {
			Box::pin(async move { Ok(None) })
		}

		fn write<'a>(&'a self, _key: &'a CacheKey, _token: Token) -> StoreFuture<'a, ()> {
			Box::pin(async move {
				Err(StoreError::Backend { message: "disk full".into() })
			})
		}
	}

	struct RecordingSink(Mutex<Vec<RefreshOutcome>>);
	impl EventSink for RecordingSink {
		fn publish(&self, event: &RefreshEvent) {
			self.0.lock().push(event.outcome);
		}
	}

	#[tokio::test]
	async fn store_write_failure_still_returns_the_token() {
		let clock = clock();
		let source = Arc::new(ScriptedSource::new(clock.clone(), []));
		let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
		let manager = RefreshManager::builder(identity(), source.clone())
			.store(Arc::new(FailingStore))
			.clock(clock)
			.sink(sink.clone())
			.build();
		let token = manager
			.get_token(TokenRequest::new(scope()))
			.await
			.expect("A cache-write failure must not fail the acquisition.");

		assert_eq!(token.access_token.expose(), "token-1");
		assert_eq!(manager.metrics().store_write_failures(), 1);
		assert_eq!(sink.0.lock().as_slice(), &[RefreshOutcome::StoreWriteFailed]);
	}
}
