//! Cache contracts and built-in token stores.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Token},
	credentials::{ClientId, CredentialIdentity},
};

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Cache backend contract: one current [`Token`] per key, overwritten on refresh.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Fetches the token stored under the key, if present.
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Token>>;

	/// Stores or replaces the token under the key.
	fn write<'a>(&'a self, key: &'a CacheKey, token: Token) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying a cached token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Authority the token was issued against.
	pub authority: Url,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Scope fingerprint partitioning tokens within one credential.
	pub scope_fingerprint: String,
}
impl CacheKey {
	/// Builds a key from the credential identity and the requested scopes.
	pub fn new(identity: &CredentialIdentity, scope: &ScopeSet) -> Self {
		Self {
			authority: identity.authority.clone(),
			client_id: identity.client_id.clone(),
			scope_fingerprint: scope.fingerprint(),
		}
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}|{}|{}", self.authority, self.client_id, self.scope_fingerprint)
	}
}
