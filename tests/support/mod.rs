//! Shared fixtures for manager integration tests.

// crates.io
use httpmock::MockServer;
// self
use token_keeper::{
	_preludet::*,
	auth::ScopeSet,
	credentials::Credentials,
	manager::RefreshManager,
	store::MemoryStore,
};

pub const CLIENT_ID: &str = "integration-client";
pub const CLIENT_SECRET: &str = "integration-secret";

/// Token endpoint path derived from the authority by the default convention.
pub const TOKEN_PATH: &str = "/tenant/oauth2/v2.0/token";

pub fn scope() -> ScopeSet {
	ScopeSet::new(["https://example.com/.default"]).expect("Scope fixture should be valid.")
}

pub fn build_manager(server: &MockServer) -> (Arc<RefreshManager>, Arc<MemoryStore>) {
	let credentials = Credentials::parse(server.url("/tenant"), CLIENT_ID, CLIENT_SECRET)
		.expect("Credential fixture should be valid.");

	build_reqwest_test_manager(credentials).expect("Test manager should build.")
}
