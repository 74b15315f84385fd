//! Background-refreshed OAuth 2.0 client-credentials token manager: single-flight
//! acquisition, pluggable caching, and a cancellable refresh schedule in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backoff;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod http;
pub mod manager;
pub mod obs;
pub mod source;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		credentials::Credentials,
		http::ReqwestTransport,
		manager::RefreshManager,
		source::{ClientCredentialsSource, TokenSource},
		store::{CacheStore, MemoryStore},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs a [`RefreshManager`] backed by an in-memory store and the reqwest transport
	/// used across integration tests.
	pub fn build_reqwest_test_manager(
		credentials: Credentials,
	) -> Result<(Arc<RefreshManager>, Arc<MemoryStore>)> {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CacheStore> = store_backend.clone();
		let source: Arc<dyn TokenSource> = Arc::new(ClientCredentialsSource::with_transport(
			&credentials,
			test_reqwest_transport(),
		)?);
		let manager = RefreshManager::builder(credentials.identity(), source).store(store).build();

		Ok((Arc::new(manager), store_backend))
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))]
use {color_eyre as _, httpmock as _, token_keeper as _, tracing_subscriber as _};
