//! Keeps a service token warm with the background refresh schedule, printing every
//! acquisition outcome as it happens.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use token_keeper::{
	auth::ScopeSet,
	backoff::BackoffConfig,
	credentials::Credentials,
	http::ReqwestTransport,
	manager::{BackgroundConfig, RefreshManager, TokenRequest},
	obs::{EventSink, RefreshEvent},
	reqwest::Client,
	source::{ClientCredentialsSource, TokenSource},
};

struct PrintSink;
impl EventSink for PrintSink {
	fn publish(&self, event: &RefreshEvent) {
		match event.latency {
			Some(latency) =>
				println!("[{}] {} ({latency})", event.at, event.outcome),
			None => println!("[{}] {}", event.at, event.outcome),
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt::init();

	let server = MockServer::start_async().await;
	// Ninety seconds sits inside the default two-minute skew margin, so every tick
	// performs a real exchange instead of a cache hit.
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/tenant/oauth2/v2.0/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":90}",
			);
		})
		.await;
	let credentials =
		Credentials::parse(server.url("/tenant"), "demo-client", "super-secret")?;
	let transport = ReqwestTransport::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let source: Arc<dyn TokenSource> =
		Arc::new(ClientCredentialsSource::with_transport(&credentials, transport)?);
	let manager = Arc::new(
		RefreshManager::builder(credentials.identity(), source)
			.sink(Arc::new(PrintSink))
			.build(),
	);
	let scope = ScopeSet::new(["https://example.com/.default"])?;
	let schedule = manager.spawn_background_refresh(scope.clone(), BackgroundConfig {
		interval: Duration::from_secs(2),
		max_jitter: Duration::ZERO,
		backoff: BackoffConfig::default(),
	});

	tokio::time::sleep(Duration::from_secs(7)).await;
	schedule.shutdown().await;

	let token = manager.get_token(TokenRequest::new(scope)).await?;

	println!(
		"Current token expires on {}, acquired through {} exchange(s) ({} endpoint hit(s)).",
		token.expires_on,
		manager.metrics().refreshes(),
		token_mock.calls_async().await,
	);

	Ok(())
}
