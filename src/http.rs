//! Transport primitives shared by discovery fetches and token exchanges.
//!
//! [`TokenHttpClient`] is the broker's only dependency on an HTTP stack: both network touch
//! points (the `.well-known` GET and the token POST) run through handles it produces. Every
//! handle carries a [`ResponseMetadataSlot`]; implementations publish the HTTP status and
//! Retry-After hint of the most recent response into the slot so the exchange layer can
//! classify failures without reaching into transport-specific error types.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Abstraction over HTTP transports capable of executing the broker's outbound requests.
///
/// Callers provide an implementation (typically behind `Arc<T>`) and the broker requests a
/// short-lived [`AsyncHttpClient`] handle per outbound call. Implementations must be
/// `Send + Sync + 'static` so one transport can serve many broker clients, and the request
/// futures their handles return must be `Send` for the lifetime of the in-flight operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records outcomes in `slot`.
	///
	/// Handles must clear the slot (via [`ResponseMetadataSlot::take`]) before dispatching a
	/// request so stale metadata never leaks across attempts, and must store fresh metadata
	/// as soon as a response yields status headers.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent HTTP response, used for error classification.
///
/// Additional fields may be added in future releases, so downstream code should construct
/// values using field names instead of struct update syntax.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The broker creates a fresh slot per outbound request and reads whatever the transport
/// captured immediately after the request resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Reqwest-backed default transport.
///
/// Token requests must not follow redirects (OAuth 2.0 token endpoints answer directly), so
/// custom [`ReqwestClient`] values handed to [`with_client`](Self::with_client) should
/// disable redirect following.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client }
	}

	/// Builds a client with the provided overall request timeout.
	///
	/// The timeout bounds every suspension point of the broker, discovery and exchange alike.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout.unsigned_abs()).build()?;

		Ok(Self { client })
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle { client: self.client.clone(), slot }
	}
}

#[cfg(feature = "reqwest")]
/// Handle produced by [`ReqwestHttpClient`] that captures response metadata per request.
#[derive(Clone)]
pub struct InstrumentedHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.client.clone();
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			slot.store(ResponseMetadata {
				status: Some(status.as_u16()),
				retry_after: retry_after_hint(&headers),
			});

			let body = response.bytes().await.map_err(Box::new)?.to_vec();
			let mut captured = HttpResponse::new(body);

			*captured.status_mut() = status;
			*captured.headers_mut() = headers;

			Ok(captured)
		})
	}
}

/// Parses a Retry-After header as either delta-seconds or an HTTP-date (RFC 9110).
#[cfg(feature = "reqwest")]
fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}

	let moment = OffsetDateTime::parse(raw, &Rfc2822).ok()?;
	let delta = moment - OffsetDateTime::now_utc();

	delta.is_positive().then_some(delta)
}
