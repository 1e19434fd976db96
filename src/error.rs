//! Broker-level error taxonomy shared across configuration, discovery, signing, and exchange.
//!
//! Low-level components return their own typed errors; the access coordinator aggregates them
//! into the canonical [`Error`] and annotates it with the owning organization/client before the
//! failure reaches a caller. Retryability is decided here, once, via
//! [`TokenError::is_retryable`] and [`Error::is_retryable`]—route handlers apply their own
//! backoff policy on top instead of re-deriving the classification per call site.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, IdentifierError, OrganizationId, ScopeValidationError, TokenRecordBuilderError},
	exchange::Grant,
};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Static configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Authorization-server metadata could not be discovered.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// Client assertion could not be signed; configuration defect, never retried.
	#[error(transparent)]
	Signing(#[from] SigningError),
	/// Token endpoint exchange failure.
	#[error(transparent)]
	Token(#[from] TokenError),

	/// Failure annotated with the organization/client whose token acquisition failed.
	#[error("Authorization failed for {organization}/{client}.")]
	Auth {
		/// Organization that owns the failing client configuration.
		organization: OrganizationId,
		/// Backend-services client identifier.
		client: ClientId,
		/// Underlying failure.
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Returns `true` when the failure is worth retrying with backoff at the call site.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Storage(_) | Self::Config(_) | Self::Signing(_) => false,
			Self::Discovery(e) => e.is_retryable(),
			Self::Token(e) => e.is_retryable(),
			Self::Auth { source, .. } => source.is_retryable(),
		}
	}

	/// Wraps the error with organization/client context; already-annotated errors pass through.
	pub(crate) fn with_context(self, organization: &OrganizationId, client: &ClientId) -> Self {
		match self {
			annotated @ Self::Auth { .. } => annotated,
			source => Self::Auth {
				organization: organization.clone(),
				client: client.clone(),
				source: Box::new(source),
			},
		}
	}
}

/// Configuration and validation failures raised while resolving a client configuration.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required configuration field was absent.
	#[error("Client configuration is missing the required `{field}` field.")]
	MissingField {
		/// Name of the first missing field, in resolution order.
		field: &'static str,
	},
	/// A URL-shaped field did not parse as an absolute URL.
	#[error("Client configuration field `{field}` is not a valid absolute URL.")]
	InvalidUrl {
		/// Name of the offending field.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The private key did not parse under the configured signing algorithm.
	#[error("Private key does not parse under the configured signing algorithm.")]
	InvalidKey {
		/// Underlying key decoding failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// The configured signing algorithm is not part of the supported set.
	#[error("Unsupported signing algorithm `{algorithm}`.")]
	UnsupportedAlgorithm {
		/// Algorithm label that was supplied.
		algorithm: String,
	},
	/// Organization or client identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// Configured scopes cannot be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),

	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// The token endpoint URL was rejected by the exchange layer.
	#[error("Token endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] TokenRecordBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while fetching or parsing a `.well-known` discovery document.
///
/// Discovery is never retried internally; [`DiscoveryError::is_retryable`] tells the caller
/// whether a retry with backoff is plausible (network/5xx) or pointless (malformed document).
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// Discovery request could not be constructed.
	#[error("Discovery request could not be constructed.")]
	Request(#[from] oauth2::http::Error),
	/// Network failure while fetching the discovery document.
	#[error("Network error occurred while fetching the discovery document.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Discovery endpoint answered with a non-success status.
	#[error("Discovery endpoint {url} returned HTTP {status}.")]
	Http {
		/// HTTP status code returned by the endpoint.
		status: u16,
		/// URL that was fetched.
		url: String,
	},
	/// Discovery document is not valid JSON.
	#[error("Discovery document is malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Discovery document does not advertise a token endpoint.
	#[error("Discovery document for issuer {issuer} is missing token_endpoint.")]
	MissingTokenEndpoint {
		/// Issuer whose document was incomplete.
		issuer: String,
	},
	/// Advertised token endpoint is not a valid URL.
	#[error("Discovery document advertises an invalid token_endpoint.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl DiscoveryError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` for transient discovery failures (network, 5xx, 429).
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Network { .. } => true,
			Self::Http { status, .. } => *status == 429 || *status >= 500,
			Self::Request(_)
			| Self::Parse { .. }
			| Self::MissingTokenEndpoint { .. }
			| Self::InvalidTokenEndpoint { .. } => false,
		}
	}
}

/// Failure while signing the JWT client assertion.
///
/// Signing only fails when the configured key or algorithm is defective, so the error is fatal
/// and never retried.
#[derive(Debug, ThisError)]
#[error("Failed to sign the client assertion.")]
pub struct SigningError {
	/// Underlying JWT encoding failure.
	#[source]
	pub source: jsonwebtoken::errors::Error,
}

/// Classification of a token endpoint rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorKind {
	/// Client authentication failed (bad assertion, revoked client).
	InvalidClient,
	/// Provider rejected the grant (e.g., a stale refresh token).
	InvalidGrant,
	/// Requested scopes exceed what the client is registered for.
	InvalidScope,
	/// Temporary upstream failure; retry with backoff.
	Transient,
}
impl TokenErrorKind {
	/// Returns `true` when the classification permits a caller-level retry.
	pub fn is_retryable(self) -> bool {
		matches!(self, Self::Transient)
	}

	/// Classifies a token endpoint failure from its OAuth error fields and HTTP status.
	///
	/// Structured OAuth fields win over the status code; network-shaped failures are handled
	/// before classification reaches this helper.
	pub(crate) fn classify(
		status: Option<u16>,
		oauth_error: Option<&str>,
		error_description: Option<&str>,
	) -> Self {
		if let Some(kind) = oauth_error.and_then(match_exact_value) {
			return kind;
		}
		if let Some(kind) = error_description.and_then(match_contained_value) {
			return kind;
		}

		classify_status(status)
	}
}

/// Token endpoint exchange failure carrying the OAuth2 error body and HTTP status.
#[derive(Debug, ThisError)]
pub enum TokenError {
	/// Authorization server answered with an OAuth 2.0 error body.
	#[error("Token endpoint rejected the {grant} grant: {message}")]
	Rejected {
		/// Grant that was being exchanged.
		grant: Grant,
		/// Retryability classification.
		kind: TokenErrorKind,
		/// Human-readable summary of the rejection.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// OAuth `error` field from the response body.
		oauth_error: Option<String>,
		/// OAuth `error_description` field from the response body.
		error_description: Option<String>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
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
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}
impl TokenError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure is transient (network, IO, 429/5xx, parse glitches).
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Rejected { kind, .. } => kind.is_retryable(),
			Self::MalformedResponse { .. } | Self::Network { .. } | Self::Io(_) | Self::Endpoint { .. } =>
				true,
		}
	}
}

fn match_exact_value(value: &str) -> Option<TokenErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(TokenErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(TokenErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(TokenErrorKind::InvalidScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(TokenErrorKind::Transient)
	} else {
		None
	}
}

fn match_contained_value(value: &str) -> Option<TokenErrorKind> {
	let lowered = value.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(TokenErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(TokenErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(TokenErrorKind::InvalidScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(TokenErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> TokenErrorKind {
	match status {
		Some(400 | 404 | 410) => TokenErrorKind::InvalidGrant,
		Some(401) => TokenErrorKind::InvalidClient,
		Some(403) => TokenErrorKind::InvalidScope,
		Some(429) => TokenErrorKind::Transient,
		Some(code) if code >= 500 => TokenErrorKind::Transient,
		_ => TokenErrorKind::Transient,
	}
}
