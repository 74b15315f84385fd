//! Cancellable background refresh schedule.
//!
//! The loop warms the token immediately, then re-acquires on a fixed interval with a
//! random early jitter so many instances never stampede the token endpoint together.
//! After a failed tick the next attempt follows an exponential backoff, never waiting
//! longer than the regular interval. The cancel signal is only observed between ticks;
//! an exchange already in flight runs to completion and its outcome still lands in the
//! cache.

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
use tokio::{select, sync::watch, task::JoinHandle, time};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	backoff::{BackoffConfig, BackoffState},
	manager::{RefreshManager, TokenRequest},
};

/// Schedule tuning for [`RefreshManager::spawn_background_refresh`].
#[derive(Clone, Copy, Debug)]
pub struct BackgroundConfig {
	/// Base sleep between successful ticks.
	pub interval: StdDuration,
	/// Upper bound of the random early jitter subtracted from `interval`.
	pub max_jitter: StdDuration,
	/// Backoff applied between failing ticks.
	pub backoff: BackoffConfig,
}
impl Default for BackgroundConfig {
	fn default() -> Self {
		Self {
			interval: StdDuration::from_secs(300),
			max_jitter: StdDuration::from_secs(30),
			backoff: BackoffConfig::default(),
		}
	}
}

/// Handle controlling a spawned refresh loop.
///
/// Dropping the handle cancels the loop the same way [`stop`](Self::stop) does; the task
/// detaches and halts after its current tick.
pub struct BackgroundRefresh {
	stop_tx: watch::Sender<bool>,
	handle: JoinHandle<()>,
}
impl BackgroundRefresh {
	/// Signals the loop to stop once the current tick completes.
	pub fn stop(&self) {
		let _ = self.stop_tx.send(true);
	}

	/// Stops the loop and waits for it to finish.
	pub async fn shutdown(self) {
		self.stop();

		let _ = self.handle.await;
	}

	/// Returns `true` once the loop has exited.
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}

impl RefreshManager {
	/// Spawns a loop keeping the token for `scope` warm until cancelled.
	///
	/// Must be called within a tokio runtime. Each tick is a standalone
	/// [`get_token`](Self::get_token); a failing tick never stops the schedule.
	pub fn spawn_background_refresh(
		self: &Arc<Self>,
		scope: ScopeSet,
		config: BackgroundConfig,
	) -> BackgroundRefresh {
		let (stop_tx, stop_rx) = watch::channel(false);
		let handle = tokio::spawn(refresh_loop(Arc::clone(self), scope, config, stop_rx));

		BackgroundRefresh { stop_tx, handle }
	}
}

async fn refresh_loop(
	manager: Arc<RefreshManager>,
	scope: ScopeSet,
	config: BackgroundConfig,
	mut stop_rx: watch::Receiver<bool>,
) {
	let mut backoff = BackoffState::new(config.backoff);

	loop {
		// The exchange is never raced against the cancel signal, so a tick that is
		// already in flight always finishes and caches its outcome.
		let delay = match manager.get_token(TokenRequest::new(scope.clone())).await {
			Ok(_) => {
				backoff.succeeded();

				jittered(config.interval, config.max_jitter)
			},
			Err(_) => backoff.failed().min(config.interval),
		};

		if *stop_rx.borrow() {
			return;
		}

		select! {
			_ = time::sleep(delay) => {},
			_ = cancelled(&mut stop_rx) => return,
		}
	}
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
	while !*rx.borrow_and_update() {
		if rx.changed().await.is_err() {
			return;
		}
	}
}

fn jittered(interval: StdDuration, max_jitter: StdDuration) -> StdDuration {
	if max_jitter.is_zero() {
		return interval;
	}

	let jitter = rand::rng().random_range(StdDuration::ZERO..=max_jitter);

	interval.saturating_sub(jitter)
}
