//! Client-credential configuration: validated identifiers, authority handling, and
//! environment loading.

// std
use std::{borrow::Borrow, env, ops::Deref};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

const CLIENT_ID_MAX_LEN: usize = 128;
const DEFAULT_TOKEN_ENDPOINT_SEGMENTS: [&str; 3] = ["oauth2", "v2.0", "token"];

/// Error returned when client identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ClientIdError {
	/// The identifier was empty.
	#[error("Client identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Client identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Client identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Validated OAuth client identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);
impl ClientId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ClientIdError> {
		let view = value.as_ref();

		validate_client_id(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for ClientId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ClientId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for ClientId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<ClientId> for String {
	fn from(value: ClientId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ClientId {
	type Error = ClientIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_client_id(&value)?;

		Ok(Self(value))
	}
}
impl Debug for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ClientId({})", self.0)
	}
}
impl Display for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for ClientId {
	type Err = ClientIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_client_id(view: &str) -> Result<(), ClientIdError> {
	if view.is_empty() {
		return Err(ClientIdError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(ClientIdError::ContainsWhitespace);
	}
	if view.len() > CLIENT_ID_MAX_LEN {
		return Err(ClientIdError::TooLong { max: CLIENT_ID_MAX_LEN });
	}

	Ok(())
}

/// Non-secret part of a credential; keys the cache alongside the scope fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialIdentity {
	/// Authority base URL the tokens are issued against.
	pub authority: Url,
	/// Client identifier the tokens are issued to.
	pub client_id: ClientId,
}

/// Immutable client-credentials configuration.
///
/// The authority must use HTTPS; violations surface as [`ConfigError`] at construction
/// and are never retried.
#[derive(Clone)]
pub struct Credentials {
	identity: CredentialIdentity,
	client_secret: TokenSecret,
	token_endpoint: Option<Url>,
}
impl Credentials {
	/// Creates credentials from an already-parsed authority URL.
	pub fn new(
		authority: Url,
		client_id: ClientId,
		client_secret: TokenSecret,
	) -> Result<Self, ConfigError> {
		require_https("authority", &authority)?;

		Ok(Self {
			identity: CredentialIdentity { authority, client_id },
			client_secret,
			token_endpoint: None,
		})
	}

	/// Creates credentials, parsing the authority from a string.
	pub fn parse(
		authority: impl AsRef<str>,
		client_id: impl AsRef<str>,
		client_secret: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let authority = Url::parse(authority.as_ref())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Self::new(authority, ClientId::new(client_id)?, TokenSecret::new(client_secret))
	}

	/// Reads credentials from `<PREFIX>_CLIENT_ID`, `<PREFIX>_CLIENT_SECRET`, and
	/// `<PREFIX>_AUTHORITY` (or `<PREFIX>_TENANT_ID`, from which the Microsoft login
	/// authority is derived).
	///
	/// Missing or empty variables are configuration errors.
	pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
		let client_id = required_env(prefix, "CLIENT_ID")?;
		let client_secret = required_env(prefix, "CLIENT_SECRET")?;
		let authority = resolve_authority(
			prefix,
			optional_env(prefix, "AUTHORITY"),
			optional_env(prefix, "TENANT_ID"),
		)?;
		let mut credentials = Self::parse(authority, client_id, client_secret)?;

		if let Some(endpoint) = optional_env(prefix, "TOKEN_ENDPOINT") {
			let endpoint = Url::parse(&endpoint)
				.map_err(|source| ConfigError::InvalidEndpoint { source })?;

			credentials = credentials.with_token_endpoint(endpoint)?;
		}

		Ok(credentials)
	}

	/// Overrides the token endpoint derived from the authority.
	pub fn with_token_endpoint(mut self, endpoint: Url) -> Result<Self, ConfigError> {
		require_https("token endpoint", &endpoint)?;

		self.token_endpoint = Some(endpoint);

		Ok(self)
	}

	/// Returns the identity used for cache keying.
	pub fn identity(&self) -> CredentialIdentity {
		self.identity.clone()
	}

	/// Authority base URL.
	pub fn authority(&self) -> &Url {
		&self.identity.authority
	}

	/// Client identifier.
	pub fn client_id(&self) -> &ClientId {
		&self.identity.client_id
	}

	/// Client secret.
	pub fn client_secret(&self) -> &TokenSecret {
		&self.client_secret
	}

	/// Effective token endpoint: the override when set, otherwise
	/// `{authority}/oauth2/v2.0/token`.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		if let Some(endpoint) = &self.token_endpoint {
			return Ok(endpoint.clone());
		}

		let mut endpoint = self.identity.authority.clone();

		endpoint
			.path_segments_mut()
			.map_err(|_| ConfigError::OpaqueAuthority { url: self.identity.authority.to_string() })?
			.pop_if_empty()
			.extend(DEFAULT_TOKEN_ENDPOINT_SEGMENTS);

		Ok(endpoint)
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("authority", &self.identity.authority.as_str())
			.field("client_id", &self.identity.client_id)
			.field("client_secret", &"<redacted>")
			.field("token_endpoint", &self.token_endpoint.as_ref().map(Url::as_str))
			.finish()
	}
}

fn require_https(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() != "https" {
		return Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() });
	}

	Ok(())
}

/// Picks the authority URL from the explicit variable, falling back to deriving the
/// Microsoft login authority from the tenant id.
fn resolve_authority(
	prefix: &str,
	authority: Option<String>,
	tenant: Option<String>,
) -> Result<String, ConfigError> {
	if let Some(url) = authority {
		return Ok(url);
	}

	match tenant {
		Some(tenant) => Ok(format!("https://login.microsoftonline.com/{tenant}")),
		None => Err(ConfigError::MissingAuthoritySource {
			authority_var: format!("{prefix}_AUTHORITY"),
			tenant_var: format!("{prefix}_TENANT_ID"),
		}),
	}
}

fn required_env(prefix: &str, suffix: &str) -> Result<String, ConfigError> {
	let name = format!("{prefix}_{suffix}");

	env::var(&name)
		.ok()
		.filter(|value| !value.is_empty())
		.ok_or(ConfigError::MissingEnv { name })
}

fn optional_env(prefix: &str, suffix: &str) -> Option<String> {
	env::var(format!("{prefix}_{suffix}")).ok().filter(|value| !value.is_empty())
}
