//! Token exchange engine for the backend-services grants.
//!
//! Both grants POST `application/x-www-form-urlencoded` to the token endpoint through the
//! `oauth2` crate and authenticate with an RFC 7523 client assertion instead of a client
//! secret. The assertion is attached to *every* request—including `refresh_token` grants—per
//! the strict SMART Backend Services reading. Failures are classified once here (see
//! [`crate::error::TokenErrorKind`]) and never retried internally.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId as OAuthClientId, EndpointNotSet, EndpointSet, HttpClientError,
	RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	assertion::ClientAssertion,
	auth::{ScopeSet, TokenFamily, TokenRecord},
	config::ClientConfig,
	error::{ConfigError, TokenError, TokenErrorKind},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

type ConfiguredClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

/// Grants the broker exchanges at the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
	/// Client Credentials grant minting a fresh access token.
	ClientCredentials,
	/// Refresh Token grant rotating a cached token.
	RefreshToken,
}
impl Grant {
	/// Returns the RFC 6749 identifier for the grant.
	pub fn as_str(self) -> &'static str {
		match self {
			Grant::ClientCredentials => "client_credentials",
			Grant::RefreshToken => "refresh_token",
		}
	}
}
impl Display for Grant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		grant: Grant,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: Grant,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TokenError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

/// Facade owning the configured `oauth2` client for one token endpoint.
///
/// One facade is constructed per fetch inside the coordinator's critical section, so the
/// token endpoint it targets is always the one discovery (or the explicit override) resolved
/// for this exact request.
pub(crate) struct ExchangeFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	expiry_skew: Duration,
}
impl<C, M> ExchangeFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &ClientConfig,
		token_endpoint: &Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		// No client secret is ever attached; the assertion is the credential, and the client
		// identifier travels in the form body alongside it.
		let oauth_client = BasicClient::new(OAuthClientId::new(config.client_id.to_string()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			expiry_skew: config.expiry_skew,
		})
	}

	/// Performs the `client_credentials` grant with the provided assertion.
	pub(crate) async fn client_credentials(
		&self,
		family: TokenFamily,
		scope: &ScopeSet,
		assertion: &ClientAssertion,
	) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let mut request = self
			.oauth_client
			.exchange_client_credentials()
			.add_extra_param("client_assertion_type", CLIENT_ASSERTION_TYPE)
			.add_extra_param("client_assertion", assertion.compact());

		for scope_value in scope.iter() {
			request = request.add_scope(Scope::new(scope_value.to_owned()));
		}

		let response = request.request_async(&instrumented).await.map_err(|err| {
			map_request_error(Grant::ClientCredentials, meta.take(), err, self.error_mapper.as_ref())
		})?;

		map_token_response(family, scope.clone(), response, self.expiry_skew)
			.map(|(record, _)| record)
	}

	/// Performs the `refresh_token` grant, still presenting a fresh assertion.
	///
	/// Returns the new record plus the rotated refresh secret when the server issued one, so
	/// the coordinator can drive compare-and-swap rotation in the store.
	pub(crate) async fn refresh_token(
		&self,
		family: TokenFamily,
		refresh_token: &str,
		scope: &ScopeSet,
		assertion: &ClientAssertion,
	) -> Result<(TokenRecord, Option<String>)> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let mut request = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.add_extra_param("client_assertion_type", CLIENT_ASSERTION_TYPE)
			.add_extra_param("client_assertion", assertion.compact());

		for scope_value in scope.iter() {
			request = request.add_scope(Scope::new(scope_value.to_owned()));
		}

		let response = request.request_async(&instrumented).await.map_err(|err| {
			map_request_error(Grant::RefreshToken, meta.take(), err, self.error_mapper.as_ref())
		})?;

		map_token_response(family, scope.clone(), response, self.expiry_skew)
	}
}

/// Maps a successful token response into a record with a skew-adjusted expiry.
fn map_token_response(
	family: TokenFamily,
	requested_scope: ScopeSet,
	response: FacadeTokenResponse,
	expiry_skew: Duration,
) -> Result<(TokenRecord, Option<String>)> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let granted_scope = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
		None => requested_scope.clone(),
	};
	let completed_at = OffsetDateTime::now_utc();
	let expires_at = completed_at + Duration::seconds(expires_in) - expiry_skew;
	let new_refresh = response.refresh_token().map(|token| token.secret().to_owned());
	let mut builder = TokenRecord::builder(family, requested_scope)
		.access_token(response.access_token().secret().to_owned())
		.granted_scope(granted_scope)
		.issued_at(completed_at)
		.expires_at(expires_at);

	if let Some(secret) = &new_refresh {
		builder = builder.refresh_token(secret.clone());
	}

	let record = builder.build().map_err(ConfigError::from)?;

	Ok((record, new_refresh))
}

fn map_request_error<E, M>(
	grant: Grant,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(grant, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TokenError::MalformedResponse { source: error, status: meta_status(meta_ref) }.into(),
		RequestTokenError::Other(message) => TokenError::Endpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	grant: Grant,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let oauth_error = response.error().as_ref().to_owned();
	let error_description = response.error_description().cloned();
	let status = meta_status(meta);
	let kind = TokenErrorKind::classify(status, Some(&oauth_error), error_description.as_deref());
	let message = match &error_description {
		Some(description) => format!("{oauth_error}: {description}."),
		None => format!("{oauth_error}."),
	};

	TokenError::Rejected {
		grant,
		kind,
		message,
		status,
		oauth_error: Some(oauth_error),
		error_description,
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(grant: Grant, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	let _ = grant;

	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TokenError::Endpoint {
			message: "Request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TokenError::network(err).into()
}

fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TokenError::Endpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	TokenError::Endpoint {
		message: "HTTP client error occurred while calling the token endpoint".into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
