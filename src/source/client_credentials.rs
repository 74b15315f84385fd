//! Client-credentials grant implementation of [`TokenSource`] built on the `oauth2` crate.

// crates.io
use oauth2::{
	AuthType, Client, ClientId as OAuthClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, RequestTokenError, Scope, StandardRevocableToken,
	StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Token},
	clock::{Clock, SystemClock},
	credentials::Credentials,
	error::{AcquireError, ConfigError},
	http::{ExchangeMetadata, ExchangeTransport, MetadataSlot},
	source::{SourceFuture, TokenSource},
};

/// Extra token-response fields beyond RFC 6749, currently the extended expiry hint some
/// authorities return for outage resilience.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedExpiryFields {
	/// Seconds until the extended expiry, when the authority supplies one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ext_expires_in: Option<u64>,
}
impl ExtraTokenFields for ExtendedExpiryFields {}

type ExtendedTokenResponse = StandardTokenResponse<ExtendedExpiryFields, BasicTokenType>;
type TokenClient = Client<
	BasicErrorResponse,
	ExtendedTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// [`TokenSource`] performing the client-credentials grant against the credential's
/// token endpoint.
///
/// Client authentication uses the request body (`client_secret_post`), matching what the
/// Microsoft identity platform and most large authorities accept for confidential
/// clients.
pub struct ClientCredentialsSource<T>
where
	T: ExchangeTransport,
{
	oauth_client: TokenClient,
	transport: Arc<T>,
	clock: Arc<dyn Clock>,
}
impl<T> ClientCredentialsSource<T>
where
	T: ExchangeTransport,
{
	/// Builds a source around an existing transport.
	pub fn with_transport(credentials: &Credentials, transport: T) -> Result<Self, ConfigError> {
		let endpoint = credentials.token_endpoint()?;
		let token_url = TokenUrl::new(endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let oauth_client = Client::new(OAuthClientId::new(credentials.client_id().to_string()))
			.set_client_secret(ClientSecret::new(credentials.client_secret().expose().to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self { oauth_client, transport: Arc::new(transport), clock: Arc::new(SystemClock) })
	}

	/// Overrides the clock used to stamp `issued_at` on freshly exchanged tokens.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}
}
#[cfg(feature = "reqwest")]
impl ClientCredentialsSource<crate::http::ReqwestTransport> {
	/// Builds a source with a fresh reqwest client that never follows redirects.
	pub fn from_credentials(credentials: &Credentials) -> Result<Self, ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Self::with_transport(credentials, crate::http::ReqwestTransport::with_client(client))
	}
}
impl<T> TokenSource for ClientCredentialsSource<T>
where
	T: ExchangeTransport,
{
	fn exchange<'a>(&'a self, scope: &'a ScopeSet) -> SourceFuture<'a> {
		let slot = MetadataSlot::default();

		Box::pin(async move {
			let handle = self.transport.with_metadata(slot.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(slot.take(), err))?;

			build_token(scope, self.clock.now(), response)
		})
	}
}

fn build_token(
	scope: &ScopeSet,
	issued_at: OffsetDateTime,
	response: ExtendedTokenResponse,
) -> Result<Token, AcquireError> {
	let expires_in = response
		.expires_in()
		.ok_or(AcquireError::Malformed { reason: "`expires_in` is missing".into() })?
		.as_secs();
	let expires_in = i64::try_from(expires_in)
		.map_err(|_| AcquireError::Malformed { reason: "`expires_in` is out of range".into() })?;

	if expires_in <= 0 {
		return Err(AcquireError::Malformed { reason: "`expires_in` is not positive".into() });
	}

	if let Some(scopes) = response.scopes() {
		let returned = ScopeSet::new(scopes.iter().map(|value| value.to_string())).map_err(
			|err| AcquireError::Malformed { reason: format!("returned scopes are invalid: {err}") },
		)?;

		if returned != *scope {
			return Err(AcquireError::Malformed {
				reason: "returned scopes differ from the requested set".into(),
			});
		}
	}

	let mut builder = Token::builder(scope.clone())
		.access_token(response.access_token().secret().to_owned())
		.issued_at(issued_at)
		.expires_in(Duration::seconds(expires_in));

	if let Some(ext) = response.extra_fields().ext_expires_in
		&& let Ok(ext) = i64::try_from(ext)
		&& ext > 0
	{
		builder = builder.extended_expires_in(Duration::seconds(ext));
	}

	builder.build().map_err(|err| AcquireError::Malformed { reason: err.to_string() })
}

fn map_request_error<E>(
	meta: Option<ExchangeMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> AcquireError
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.as_ref().and_then(|value| value.status);
	let retry_after = meta.as_ref().and_then(|value| value.retry_after);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let message = if let Some(description) = response.error_description() {
				format!("{} ({description})", response.error().as_ref())
			} else {
				response.error().as_ref().to_owned()
			};

			match classify(response.error().as_ref(), response.error_description(), status) {
				ErrorClass::InvalidClient => AcquireError::InvalidClient { reason: message },
				ErrorClass::Rejected => AcquireError::Rejected { reason: message },
				ErrorClass::Transient =>
					AcquireError::Transient { message, status, retry_after },
			}
		},
		RequestTokenError::Request(error) => match error {
			HttpClientError::Reqwest(inner) => AcquireError::Network { source: inner },
			HttpClientError::Io(inner) => AcquireError::Io(inner),
			HttpClientError::Http(inner) => AcquireError::Malformed {
				reason: format!("token request could not be constructed: {inner}"),
			},
			HttpClientError::Other(message) =>
				AcquireError::Transient { message, status, retry_after },
			_ => AcquireError::Transient {
				message: "HTTP client error occurred while calling the token endpoint".into(),
				status,
				retry_after,
			},
		},
		RequestTokenError::Parse(source, _body) => AcquireError::ResponseParse { source, status },
		RequestTokenError::Other(message) =>
			AcquireError::Transient { message, status, retry_after },
	}
}

enum ErrorClass {
	InvalidClient,
	Rejected,
	Transient,
}

/// Classifies an OAuth error response: structured `error`/`error_description` fields
/// first, then the HTTP status code.
fn classify(error: &str, description: Option<&String>, status: Option<u16>) -> ErrorClass {
	if let Some(class) = classify_value(error) {
		return class;
	}
	if let Some(class) = description.and_then(|value| classify_body(value)) {
		return class;
	}

	classify_status(status)
}

fn classify_value(value: &str) -> Option<ErrorClass> {
	if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ErrorClass::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("access_denied")
		|| value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ErrorClass::Rejected)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ErrorClass::Transient)
	} else {
		None
	}
}

fn classify_body(body: &str) -> Option<ErrorClass> {
	let lowered = body.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_client") => Some(ErrorClass::InvalidClient),
		text if text.contains("invalid_grant")
			|| text.contains("invalid_scope")
			|| text.contains("insufficient_scope") =>
			Some(ErrorClass::Rejected),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ErrorClass::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ErrorClass {
	match status {
		Some(400 | 403 | 404 | 410) => ErrorClass::Rejected,
		Some(401) => ErrorClass::InvalidClient,
		_ => ErrorClass::Transient,
	}
}
