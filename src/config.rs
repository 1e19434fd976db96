//! Client configuration resolution for backend-services principals.
//!
//! A [`RawClientConfig`] is whatever the secrets layer hands over—already-decrypted strings.
//! [`ClientConfig::resolve`] validates it into an immutable [`ClientConfig`], parsing the
//! private key under the configured algorithm so defective key material fails at construction
//! instead of at request time. Resolution is pure; no I/O happens here.

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, OrganizationId, ScopeSet},
	error::ConfigError,
};

/// Signing algorithms accepted for backend-services client assertions.
///
/// RS384 and ES384 are the SMART-recommended pair; RS256 is kept for authorization servers
/// that predate the recommendation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
	/// RSASSA-PKCS1-v1_5 with SHA-256.
	Rs256,
	#[default]
	/// RSASSA-PKCS1-v1_5 with SHA-384.
	Rs384,
	/// ECDSA with P-384 and SHA-384.
	Es384,
}
impl SigningAlgorithm {
	/// Returns the JOSE identifier for the algorithm.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Rs256 => "RS256",
			Self::Rs384 => "RS384",
			Self::Es384 => "ES384",
		}
	}

	/// Returns the matching `jsonwebtoken` algorithm.
	pub fn jwt_algorithm(self) -> Algorithm {
		match self {
			Self::Rs256 => Algorithm::RS256,
			Self::Rs384 => Algorithm::RS384,
			Self::Es384 => Algorithm::ES384,
		}
	}
}
impl Display for SigningAlgorithm {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for SigningAlgorithm {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"RS256" => Ok(Self::Rs256),
			"RS384" => Ok(Self::Rs384),
			"ES384" => Ok(Self::Es384),
			other => Err(ConfigError::UnsupportedAlgorithm { algorithm: other.to_owned() }),
		}
	}
}

/// Raw, unvalidated client configuration as handed over by the secrets/persistence layer.
///
/// The broker receives only plaintext key material; decryption belongs to the external KMS
/// wrapper. All fields are optional here so [`ClientConfig::resolve`] can report the first
/// missing required field deterministically.
#[derive(Clone, Default)]
pub struct RawClientConfig {
	/// Organization/tenant the configuration belongs to.
	pub organization: Option<String>,
	/// OAuth 2.0 client identifier.
	pub client_id: Option<String>,
	/// Authorization server identity / discovery base URL.
	pub issuer: Option<String>,
	/// Space-delimited OAuth scope string.
	pub scope: Option<String>,
	/// PEM-encoded asymmetric private key.
	pub private_key: Option<String>,
	/// Base URL of the FHIR server the tokens are for.
	pub fhir_base_url: Option<String>,
	/// Optional `kid` header value for signed assertions.
	pub key_id: Option<String>,
	/// JOSE algorithm label; defaults to `RS384` when absent.
	pub signing_algorithm: Option<String>,
	/// Explicit token endpoint that bypasses discovery entirely.
	pub token_endpoint: Option<String>,
	/// Outbound HTTP timeout override.
	pub http_timeout: Option<Duration>,
	/// Expiry safety margin override.
	pub expiry_skew: Option<Duration>,
}
impl RawClientConfig {
	/// Creates an empty raw configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the organization identifier.
	pub fn organization(mut self, value: impl Into<String>) -> Self {
		self.organization = Some(value.into());

		self
	}

	/// Sets the client identifier.
	pub fn client_id(mut self, value: impl Into<String>) -> Self {
		self.client_id = Some(value.into());

		self
	}

	/// Sets the issuer URL.
	pub fn issuer(mut self, value: impl Into<String>) -> Self {
		self.issuer = Some(value.into());

		self
	}

	/// Sets the scope string.
	pub fn scope(mut self, value: impl Into<String>) -> Self {
		self.scope = Some(value.into());

		self
	}

	/// Sets the PEM private key.
	pub fn private_key(mut self, value: impl Into<String>) -> Self {
		self.private_key = Some(value.into());

		self
	}

	/// Sets the FHIR base URL.
	pub fn fhir_base_url(mut self, value: impl Into<String>) -> Self {
		self.fhir_base_url = Some(value.into());

		self
	}

	/// Sets the `kid` header value.
	pub fn key_id(mut self, value: impl Into<String>) -> Self {
		self.key_id = Some(value.into());

		self
	}

	/// Sets the signing algorithm label.
	pub fn signing_algorithm(mut self, value: impl Into<String>) -> Self {
		self.signing_algorithm = Some(value.into());

		self
	}

	/// Sets an explicit token endpoint, bypassing discovery.
	pub fn token_endpoint(mut self, value: impl Into<String>) -> Self {
		self.token_endpoint = Some(value.into());

		self
	}

	/// Overrides the outbound HTTP timeout (defaults to 10 seconds).
	pub fn http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout = Some(timeout);

		self
	}

	/// Overrides the expiry safety margin (defaults to 30 seconds).
	pub fn expiry_skew(mut self, skew: Duration) -> Self {
		self.expiry_skew = Some(skew);

		self
	}
}
impl Debug for RawClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RawClientConfig")
			.field("organization", &self.organization)
			.field("client_id", &self.client_id)
			.field("issuer", &self.issuer)
			.field("scope", &self.scope)
			.field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
			.field("fhir_base_url", &self.fhir_base_url)
			.field("key_id", &self.key_id)
			.field("signing_algorithm", &self.signing_algorithm)
			.field("token_endpoint", &self.token_endpoint)
			.field("http_timeout", &self.http_timeout)
			.field("expiry_skew", &self.expiry_skew)
			.finish()
	}
}

/// Immutable, validated client configuration; one per organization/tenant.
#[derive(Clone)]
pub struct ClientConfig {
	/// Organization/tenant that owns this configuration.
	pub organization: OrganizationId,
	/// OAuth 2.0 client identifier; also the `iss`/`sub` of every assertion.
	pub client_id: ClientId,
	/// Authorization server identity used for discovery.
	pub issuer: Url,
	/// Normalized scopes requested on every grant.
	pub scope: ScopeSet,
	/// Base URL of the FHIR server the tokens are for.
	pub fhir_base_url: Url,
	/// Optional `kid` header value for signed assertions.
	pub key_id: Option<String>,
	/// Algorithm the private key was validated against.
	pub signing_algorithm: SigningAlgorithm,
	/// Explicit token endpoint; when set, discovery is skipped entirely.
	pub token_endpoint: Option<Url>,
	/// Outbound HTTP timeout applied to discovery and token requests.
	pub http_timeout: Duration,
	/// Safety margin subtracted from every token's nominal expiry.
	pub expiry_skew: Duration,
	signing_key: Arc<EncodingKey>,
}
impl ClientConfig {
	/// Default outbound HTTP timeout.
	pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::seconds(10);
	/// Default expiry safety margin.
	pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::seconds(30);

	/// Validates a raw configuration into an immutable [`ClientConfig`].
	///
	/// Missing required fields are reported in a fixed order (`client_id`, `issuer`, `scope`,
	/// `private_key`, `fhir_base_url`, then `organization`), so the same defective input always
	/// produces the same error.
	pub fn resolve(raw: RawClientConfig) -> Result<Self, ConfigError> {
		let client_id = raw.client_id.ok_or(ConfigError::MissingField { field: "client_id" })?;
		let issuer = raw.issuer.ok_or(ConfigError::MissingField { field: "issuer" })?;
		let scope = raw.scope.ok_or(ConfigError::MissingField { field: "scope" })?;
		let private_key =
			raw.private_key.ok_or(ConfigError::MissingField { field: "private_key" })?;
		let fhir_base_url =
			raw.fhir_base_url.ok_or(ConfigError::MissingField { field: "fhir_base_url" })?;
		let organization =
			raw.organization.ok_or(ConfigError::MissingField { field: "organization" })?;
		let organization = OrganizationId::new(organization)?;
		let client_id = ClientId::new(client_id)?;
		let issuer = parse_url("issuer", &issuer)?;
		let fhir_base_url = parse_url("fhir_base_url", &fhir_base_url)?;
		let scope = ScopeSet::from_str(&scope)?;
		let signing_algorithm = match raw.signing_algorithm.as_deref() {
			Some(label) => label.parse()?,
			None => SigningAlgorithm::default(),
		};
		let signing_key = parse_signing_key(signing_algorithm, &private_key)?;
		let token_endpoint = raw
			.token_endpoint
			.as_deref()
			.map(|value| parse_url("token_endpoint", value))
			.transpose()?;

		Ok(Self {
			organization,
			client_id,
			issuer,
			scope,
			fhir_base_url,
			key_id: raw.key_id,
			signing_algorithm,
			token_endpoint,
			http_timeout: raw.http_timeout.unwrap_or(Self::DEFAULT_HTTP_TIMEOUT),
			expiry_skew: raw.expiry_skew.unwrap_or(Self::DEFAULT_EXPIRY_SKEW),
			signing_key: Arc::new(signing_key),
		})
	}

	/// Returns the validated signing key for assertion generation.
	pub fn signing_key(&self) -> &EncodingKey {
		&self.signing_key
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("organization", &self.organization)
			.field("client_id", &self.client_id)
			.field("issuer", &self.issuer.as_str())
			.field("scope", &self.scope)
			.field("fhir_base_url", &self.fhir_base_url.as_str())
			.field("key_id", &self.key_id)
			.field("signing_algorithm", &self.signing_algorithm)
			.field("token_endpoint", &self.token_endpoint.as_ref().map(Url::as_str))
			.field("http_timeout", &self.http_timeout)
			.field("expiry_skew", &self.expiry_skew)
			.field("signing_key", &"<redacted>")
			.finish()
	}
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn parse_signing_key(
	algorithm: SigningAlgorithm,
	pem: &str,
) -> Result<EncodingKey, ConfigError> {
	match algorithm {
		SigningAlgorithm::Rs256 | SigningAlgorithm::Rs384 =>
			EncodingKey::from_rsa_pem(pem.as_bytes()),
		SigningAlgorithm::Es384 => EncodingKey::from_ec_pem(pem.as_bytes()),
	}
	.map_err(|source| ConfigError::InvalidKey { source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rs384_private.pem");

	fn raw() -> RawClientConfig {
		RawClientConfig::new()
			.organization("org-hospital")
			.client_id("backend-client")
			.issuer("https://as.example.com")
			.scope("system/Patient.read system/Observation.read")
			.private_key(RSA_PRIVATE_PEM)
			.fhir_base_url("https://fhir.example.com/r4")
	}

	#[test]
	fn resolve_applies_defaults() {
		let config = raw().resolve_ok();

		assert_eq!(config.signing_algorithm, SigningAlgorithm::Rs384);
		assert_eq!(config.http_timeout, ClientConfig::DEFAULT_HTTP_TIMEOUT);
		assert_eq!(config.expiry_skew, ClientConfig::DEFAULT_EXPIRY_SKEW);
		assert!(config.token_endpoint.is_none());
		assert_eq!(config.scope.len(), 2);
	}

	#[test]
	fn missing_fields_are_reported_in_order() {
		let err = RawClientConfig::new().resolve_err();

		assert!(matches!(err, ConfigError::MissingField { field: "client_id" }));

		let err = RawClientConfig::new().client_id("c").resolve_err();

		assert!(matches!(err, ConfigError::MissingField { field: "issuer" }));

		let err = RawClientConfig::new().client_id("c").issuer("https://as.example").resolve_err();

		assert!(matches!(err, ConfigError::MissingField { field: "scope" }));

		let err = RawClientConfig::new()
			.client_id("c")
			.issuer("https://as.example")
			.scope("system/Patient.read")
			.resolve_err();

		assert!(matches!(err, ConfigError::MissingField { field: "private_key" }));

		let err = RawClientConfig::new()
			.client_id("c")
			.issuer("https://as.example")
			.scope("system/Patient.read")
			.private_key(RSA_PRIVATE_PEM)
			.resolve_err();

		assert!(matches!(err, ConfigError::MissingField { field: "fhir_base_url" }));
	}

	#[test]
	fn malformed_keys_fail_at_construction() {
		let err = raw().private_key("not a pem").resolve_err();

		assert!(matches!(err, ConfigError::InvalidKey { .. }));

		let err = raw().signing_algorithm("ES384").resolve_err();

		assert!(
			matches!(err, ConfigError::InvalidKey { .. }),
			"An RSA key must not validate under ES384.",
		);
	}

	#[test]
	fn unsupported_algorithms_are_rejected() {
		let err = raw().signing_algorithm("HS256").resolve_err();

		assert!(matches!(err, ConfigError::UnsupportedAlgorithm { .. }));
	}

	#[test]
	fn relative_urls_are_rejected() {
		let err = raw().issuer("/relative").resolve_err();

		assert!(matches!(err, ConfigError::InvalidUrl { field: "issuer", .. }));
	}

	impl RawClientConfig {
		fn resolve_ok(self) -> ClientConfig {
			ClientConfig::resolve(self).expect("Configuration fixture should resolve successfully.")
		}

		fn resolve_err(self) -> ConfigError {
			ClientConfig::resolve(self).expect_err("Configuration fixture should fail to resolve.")
		}
	}
}
