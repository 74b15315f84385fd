//! Thread-safe in-memory [`CacheStore`]; the manager's default backend.

// self
use crate::{
	_prelude::*,
	auth::Token,
	store::{CacheKey, CacheStore, StoreFuture},
};

/// Keeps tokens in-process; suitable for long-lived services, tests, and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<CacheKey, Token>>>);
impl MemoryStore {
	/// Number of cached tokens.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no tokens are cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CacheStore for MemoryStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Token>> {
		Box::pin(async move { Ok(self.0.read().get(key).cloned()) })
	}

	fn write<'a>(&'a self, key: &'a CacheKey, token: Token) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().insert(key.clone(), token);

			Ok(())
		})
	}
}
