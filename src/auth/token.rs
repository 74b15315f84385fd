//! Immutable bearer token value, freshness helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{scope::ScopeSet, secret::TokenSecret},
};

/// Errors produced by [`TokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_on or expires_in.")]
	MissingExpiry,
}

/// Immutable bearer token issued by a token source.
///
/// Freshness is always evaluated against a caller-supplied instant so the manager can
/// inject its own clock; the token itself never reads the system time after construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
	/// Normalized scopes the token was granted for.
	pub scope: ScopeSet,
	/// Bearer secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the token was issued, recorded by the acquiring source.
	pub issued_at: OffsetDateTime,
	/// Instant the token stops being valid.
	pub expires_on: OffsetDateTime,
	/// Extended expiry for outage resilience, if the provider supplied one.
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Whether this value was loaded from a cache store rather than freshly exchanged.
	#[serde(skip, default)]
	pub from_cache: bool,
}
impl Token {
	/// Returns a builder for assembling a token from a provider response.
	pub fn builder(scope: ScopeSet) -> TokenBuilder {
		TokenBuilder::new(scope)
	}

	/// Returns a copy flagged as originating from a cache store.
	pub fn as_cached(&self) -> Self {
		Self { from_cache: true, ..self.clone() }
	}

	/// Returns `true` while the token remains usable at `instant` once `skew` is
	/// subtracted from its lifetime.
	///
	/// A token whose remaining lifetime is exactly the skew margin counts as stale.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		instant + skew < self.expires_on
	}

	/// Remaining lifetime at `instant`; zero once expired.
	pub fn remaining(&self, instant: OffsetDateTime) -> Duration {
		(self.expires_on - instant).max(Duration::ZERO)
	}

	/// Returns `true` once `instant` reaches the expiry instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_on
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_on", &self.expires_on)
			.field("extended_expires_on", &self.extended_expires_on)
			.field("from_cache", &self.from_cache)
			.finish()
	}
}

/// Builder for [`Token`].
#[derive(Clone, Debug)]
pub struct TokenBuilder {
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_on: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	extended_expires_in: Option<Duration>,
}
impl TokenBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			access_token: None,
			issued_at: None,
			expires_on: None,
			expires_in: None,
			extended_expires_in: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_on(mut self, instant: OffsetDateTime) -> Self {
		self.expires_on = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets an extended expiry duration from the issued instant.
	pub fn extended_expires_in(mut self, duration: Duration) -> Self {
		self.extended_expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Token`].
	pub fn build(self) -> Result<Token, TokenBuilderError> {
		let access_token = self.access_token.ok_or(TokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_on = match (self.expires_on, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenBuilderError::MissingExpiry),
		};
		let extended_expires_on = self.extended_expires_in.map(|delta| issued_at + delta);

		Ok(Token {
			scope: self.scope,
			access_token,
			issued_at,
			expires_on,
			extended_expires_on,
			from_cache: false,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn scope() -> ScopeSet {
		ScopeSet::new(["https://example.com/.default"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn freshness_accounts_for_skew() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = Token::builder(scope())
			.access_token("bearer")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token builder should succeed.");
		let skew = Duration::minutes(2);

		assert!(token.is_fresh_at(issued, skew));
		assert!(token.is_fresh_at(issued + Duration::minutes(57), skew));
		assert!(
			!token.is_fresh_at(issued + Duration::minutes(58), skew),
			"Remaining lifetime equal to the skew margin counts as stale.",
		);
		assert!(!token.is_fresh_at(issued + Duration::hours(2), skew));
	}

	#[test]
	fn remaining_saturates_at_zero() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = Token::builder(scope())
			.access_token("bearer")
			.issued_at(issued)
			.expires_on(issued + Duration::minutes(30))
			.build()
			.expect("Token builder should succeed.");

		assert_eq!(token.remaining(issued), Duration::minutes(30));
		assert_eq!(token.remaining(issued + Duration::hours(1)), Duration::ZERO);
		assert!(token.is_expired_at(issued + Duration::minutes(30)));
		assert!(!token.is_expired_at(issued + Duration::minutes(29)));
	}

	#[test]
	fn builder_requires_token_and_expiry() {
		assert!(matches!(
			Token::builder(scope()).expires_in(Duration::hours(1)).build(),
			Err(TokenBuilderError::MissingAccessToken),
		));
		assert!(matches!(
			Token::builder(scope()).access_token("bearer").build(),
			Err(TokenBuilderError::MissingExpiry),
		));
	}

	#[test]
	fn cached_copies_are_flagged() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = Token::builder(scope())
			.access_token("bearer")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.extended_expires_in(Duration::hours(24))
			.build()
			.expect("Token builder should succeed.");

		assert!(!token.from_cache);
		assert!(token.as_cached().from_cache);
		assert_eq!(token.extended_expires_on, Some(issued + Duration::hours(24)));

		let debug = format!("{token:?}");

		assert!(debug.contains("<redacted>"));
		assert!(!debug.contains("bearer"));
	}
}
