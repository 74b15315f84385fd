//! Error types shared across the manager, token sources, and cache stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; fatal at construction and never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token exchange failure; the same shared value is observed by every caller
	/// queued behind the failing single-flight exchange.
	#[error(transparent)]
	Acquisition(#[from] Arc<AcquireError>),
	/// Cache-store read failure.
	#[error("{0}")]
	Storage(#[from] crate::store::StoreError),
}
impl Error {
	pub(crate) fn acquisition(err: AcquireError) -> Self {
		Self::Acquisition(Arc::new(err))
	}
}
impl From<AcquireError> for Error {
	fn from(e: AcquireError) -> Self {
		Self::acquisition(e)
	}
}

/// Configuration and validation failures raised while assembling a manager or source.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Authority or token endpoint URL cannot be parsed.
	#[error("Authority or token endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Authority URL cannot serve as a base for the default token endpoint.
	#[error("Authority URL cannot be extended with a token endpoint path: {url}.")]
	OpaqueAuthority {
		/// Authority that failed validation.
		url: String,
	},
	/// Client identifier failed validation.
	#[error("Client identifier is invalid.")]
	InvalidClientId(#[from] crate::credentials::ClientIdError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Required environment variable is missing or empty.
	#[error("Environment variable `{name}` is missing or empty.")]
	MissingEnv {
		/// Variable name, including the caller-supplied prefix.
		name: String,
	},
	/// Neither the authority nor the tenant environment variable was provided.
	#[error("Either `{authority_var}` or `{tenant_var}` must be set.")]
	MissingAuthoritySource {
		/// Authority variable name, including the caller-supplied prefix.
		authority_var: String,
		/// Tenant variable name, including the caller-supplied prefix.
		tenant_var: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Classified token-exchange failures.
///
/// Recoverable by design: the manager never retries inside a single acquisition, but the
/// caller or the background schedule's next tick may try again.
#[derive(Debug, ThisError)]
pub enum AcquireError {
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or manager-supplied reason string.
		reason: String,
	},
	/// Provider refused to issue a token for the request.
	#[error("Provider rejected the token request: {reason}.")]
	Rejected {
		/// Provider- or manager-supplied reason string.
		reason: String,
	},
	/// Temporary upstream failure; safe to retry.
	#[error("Token endpoint returned a temporary failure: {message}.")]
	Transient {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with a payload the manager cannot use.
	#[error("Token endpoint returned an unusable response: {reason}.")]
	Malformed {
		/// What made the response unusable.
		reason: String,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl AcquireError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when retrying the exchange could plausibly succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient { .. } | Self::Network { .. } | Self::Io(_))
	}
}
