//! HTTP transport seam for the token exchange.
//!
//! [`ExchangeTransport`] is the crate's only coupling to an HTTP stack. A transport hands
//! out short-lived [`AsyncHttpClient`] handles that record the observed HTTP status and
//! `Retry-After` hint into a shared [`MetadataSlot`], which the source reads back when it
//! classifies a failed exchange. Handles must call [`MetadataSlot::take`] before
//! dispatching so metadata from a previous attempt never leaks into the next one.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// HTTP transport capable of executing token exchanges.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can back many
/// concurrent exchanges, and the futures their handles return must be `Send` so the
/// source can box them.
pub trait ExchangeTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying HTTP stack.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle bound to a [`MetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records response metadata into `slot`.
	fn with_metadata(&self, slot: MetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default)]
pub struct ExchangeMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot shared between the transport handle and the error classifier.
///
/// The source creates a fresh slot per exchange and reads it immediately after the
/// `oauth2` call resolves.
#[derive(Clone, Debug, Default)]
pub struct MetadataSlot(Arc<Mutex<Option<ExchangeMetadata>>>);
impl MetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ExchangeMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Consumes and returns the captured metadata, if any.
	pub fn take(&self) -> Option<ExchangeMetadata> {
		self.0.lock().take()
	}
}

/// Default transport built on [`ReqwestClient`].
///
/// Token endpoints return results directly rather than redirecting, so custom clients
/// passed in here should disable redirect following.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Returns the wrapped client.
	pub fn client(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ExchangeTransport for ReqwestTransport {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: MetadataSlot) -> Self::Handle {
		ReqwestHandle(Arc::new(ReqwestHandleInner { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct ReqwestHandleInner {
	client: ReqwestClient,
	slot: MetadataSlot,
}

/// Handle returned by [`ReqwestTransport`]; records status and retry hints per call.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHandle(Arc<ReqwestHandleInner>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			inner.slot.store(ExchangeMetadata { status: Some(status.as_u16()), retry_after });

			let mut mapped = HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*mapped.status_mut() = status;
			*mapped.headers_mut() = headers;

			Ok(mapped)
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn slot_take_consumes_metadata() {
		let slot = MetadataSlot::default();

		slot.store(ExchangeMetadata { status: Some(429), retry_after: None });

		let meta = slot.take().expect("Stored metadata should be returned once.");

		assert_eq!(meta.status, Some(429));
		assert!(slot.take().is_none());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_parses_seconds_and_rejects_past_dates() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "120".parse().expect("Header fixture should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));

		headers.insert(
			RETRY_AFTER,
			"Wed, 01 Jan 2020 00:00:00 GMT".parse().expect("Header fixture should parse."),
		);

		assert_eq!(parse_retry_after(&headers), None);
	}
}
