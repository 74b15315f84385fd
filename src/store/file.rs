//! File-backed [`CacheStore`] persisting a JSON snapshot across restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
	sync::atomic::{AtomicBool, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::Token,
	store::{CacheKey, CacheStore, StoreError, StoreFuture},
};

/// Persists cached tokens to a JSON file after each write.
///
/// An unreadable or corrupt snapshot never blocks startup: [`open`](Self::open) degrades
/// to an empty cache and flags the recovery via
/// [`recovered_from_corruption`](Self::recovered_from_corruption), so the next refresh
/// rebuilds the file. The snapshot contains bearer secrets in the clear; callers are
/// responsible for the file's permissions.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: RwLock<HashMap<CacheKey, Token>>,
	recovered: AtomicBool,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let (snapshot, recovered) = match load_snapshot(&path) {
			Ok(snapshot) => (snapshot, false),
			Err(_) => (HashMap::new(), true),
		};

		Ok(Self {
			path,
			inner: RwLock::new(snapshot),
			recovered: AtomicBool::new(recovered),
		})
	}

	/// Returns `true` when the snapshot was unreadable at open and the store started empty.
	pub fn recovered_from_corruption(&self) -> bool {
		self.recovered.load(Ordering::SeqCst)
	}

	/// Drops every cached token and truncates the snapshot.
	pub fn reset(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		guard.clear();
		self.persist_locked(&guard)
	}

	fn persist_locked(&self, contents: &HashMap<CacheKey, Token>) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize cache snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CacheStore for FileStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Token>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn write<'a>(&'a self, key: &'a CacheKey, token: Token) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(key.clone(), token);
			self.persist_locked(&guard)
		})
	}
}

fn load_snapshot(path: &Path) -> Result<HashMap<CacheKey, Token>, StoreError> {
	if !path.exists() {
		return Ok(HashMap::new());
	}

	let metadata = path.metadata().map_err(|e| StoreError::Backend {
		message: format!("Failed to inspect {}: {e}", path.display()),
	})?;

	if metadata.len() == 0 {
		return Ok(HashMap::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;
	let entries: Vec<(CacheKey, Token)> =
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

	Ok(entries.into_iter().collect())
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::ScopeSet,
		credentials::{ClientId, CredentialIdentity},
	};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"token_keeper_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn fixture() -> (CacheKey, Token) {
		let identity = CredentialIdentity {
			authority: Url::parse("https://login.example.com/tenant")
				.expect("Authority fixture should parse."),
			client_id: ClientId::new("client-demo").expect("Client id fixture should be valid."),
		};
		let scope = ScopeSet::new(["https://example.com/.default"])
			.expect("Scope fixture should be valid.");
		let token = Token::builder(scope.clone())
			.access_token("access-token")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token fixture should build.");

		(CacheKey::new(&identity, &scope), token)
	}

	#[tokio::test]
	async fn write_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("File store should open.");
		let (key, token) = fixture();

		store.write(&key, token.clone()).await.expect("Write should persist.");
		drop(store);

		let reopened = FileStore::open(&path).expect("File store should reopen.");

		assert!(!reopened.recovered_from_corruption());

		let fetched = reopened
			.read(&key)
			.await
			.expect("Read should succeed.")
			.expect("Token should survive a reopen.");

		assert_eq!(fetched.access_token.expose(), token.access_token.expose());
		assert_eq!(fetched.expires_on, token.expires_on);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn corrupt_snapshot_degrades_to_empty() {
		let path = temp_path();

		fs::write(&path, b"{ not json").expect("Corrupt fixture should be written.");

		let store = FileStore::open(&path).expect("Corrupt snapshot must not fail open.");
		let (key, token) = fixture();

		assert!(store.recovered_from_corruption());
		assert!(store.read(&key).await.expect("Read should succeed.").is_none());

		store.write(&key, token).await.expect("Write should rebuild the snapshot.");

		let reopened = FileStore::open(&path).expect("Rebuilt snapshot should open.");

		assert!(!reopened.recovered_from_corruption());
		assert!(reopened.read(&key).await.expect("Read should succeed.").is_some());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn reset_truncates_the_snapshot() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("File store should open.");
		let (key, token) = fixture();

		store.write(&key, token).await.expect("Write should persist.");
		store.reset().expect("Reset should truncate.");

		assert!(store.read(&key).await.expect("Read should succeed.").is_none());

		let reopened = FileStore::open(&path).expect("Snapshot should reopen after reset.");

		assert!(reopened.read(&key).await.expect("Read should succeed.").is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary snapshot {}: {e}", path.display())
		});
	}
}
