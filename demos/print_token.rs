//! One-shot token acquisition backed by a file cache.
//!
//! The second run of the binary (or a second manager over the same snapshot, as below)
//! serves the token straight from disk without touching the token endpoint again.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use token_keeper::{
	auth::ScopeSet,
	credentials::Credentials,
	http::ReqwestTransport,
	manager::{RefreshManager, TokenRequest},
	reqwest::Client,
	source::{ClientCredentialsSource, TokenSource},
	store::{CacheStore, FileStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/tenant/oauth2/v2.0/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let credentials =
		Credentials::parse(server.url("/tenant"), "demo-client", "super-secret")?;
	let scope = ScopeSet::new(["https://example.com/.default"])?;
	let snapshot_path = env::temp_dir().join("token_keeper_print_token.json");
	let build_manager = || -> Result<Arc<RefreshManager>> {
		let transport = ReqwestTransport::with_client(
			Client::builder()
				.danger_accept_invalid_certs(true)
				.danger_accept_invalid_hostnames(true)
				.build()?,
		);
		let source: Arc<dyn TokenSource> =
			Arc::new(ClientCredentialsSource::with_transport(&credentials, transport)?);
		let store = FileStore::open(&snapshot_path)?;

		if store.recovered_from_corruption() {
			println!("Snapshot was unreadable; starting from an empty cache.");
		}

		let cache: Arc<dyn CacheStore> = Arc::new(store);

		Ok(Arc::new(RefreshManager::builder(credentials.identity(), source).store(cache).build()))
	};
	let token = build_manager()?.get_token(TokenRequest::new(scope.clone())).await?;

	println!("Freshly acquired access token: {}.", token.access_token.expose());

	// A brand-new manager over the same snapshot never contacts the endpoint.
	let cached = build_manager()?.get_token(TokenRequest::new(scope)).await?;

	println!(
		"Replayed from {}: from_cache={}, expires on {}.",
		snapshot_path.display(),
		cached.from_cache,
		cached.expires_on,
	);

	token_mock.assert_async().await;

	let _ = std::fs::remove_file(&snapshot_path);

	Ok(())
}
