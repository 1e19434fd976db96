//! RFC 7523 client assertion generation.
//!
//! Backend-services clients prove their identity with a short-lived JWT signed by their
//! private key instead of a client secret. The assertion is built immediately before each
//! token request and never cached or reused: `exp` is pinned to five minutes after `iat`, and
//! every signature carries a fresh 128-bit `jti` so authorization servers can reject replays.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::Header;
use rand::RngCore;
// self
use crate::{_prelude::*, config::ClientConfig, error::SigningError};

/// Fixed assertion lifetime mandated for backend-services clients.
pub const ASSERTION_LIFETIME: Duration = Duration::seconds(300);

/// Claim set of a backend-services client assertion.
///
/// `iss` and `sub` both carry the client identifier; `aud` is the token endpoint the
/// assertion will be presented to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Issuer; equals the client identifier.
	pub iss: String,
	/// Subject; equals the client identifier.
	pub sub: String,
	/// Audience; the token endpoint URL.
	pub aud: String,
	/// Unique token identifier for replay protection.
	pub jti: String,
	/// Expiration as a Unix timestamp.
	pub exp: i64,
	/// Issued-at as a Unix timestamp.
	pub iat: i64,
}

/// Ephemeral signed assertion plus the claim values it was built with.
///
/// The struct exists so audit events and tests can observe `jti`/`exp` without re-decoding
/// the JWS; the compact serialization itself is a credential and is redacted from Debug.
#[derive(Clone)]
pub struct ClientAssertion {
	compact: String,
	/// Unique identifier embedded in the `jti` claim.
	pub jti: String,
	/// Instant the assertion was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the assertion expires (`issued_at` + 5 minutes).
	pub expires_at: OffsetDateTime,
}
impl ClientAssertion {
	/// Returns the compact JWS serialization sent as `client_assertion`.
	pub fn compact(&self) -> &str {
		&self.compact
	}
}
impl Debug for ClientAssertion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientAssertion")
			.field("compact", &"<redacted>")
			.field("jti", &self.jti)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builds and signs a fresh client assertion for the provided audience.
///
/// Signing failures indicate defective configuration (the key was validated at resolution
/// time), so callers must surface them instead of retrying.
pub fn sign_assertion(
	config: &ClientConfig,
	audience: &Url,
) -> Result<ClientAssertion, SigningError> {
	let issued_at = OffsetDateTime::now_utc();
	let expires_at = issued_at + ASSERTION_LIFETIME;
	let jti = generate_jti();
	let claims = AssertionClaims {
		iss: config.client_id.to_string(),
		sub: config.client_id.to_string(),
		aud: audience.to_string(),
		jti: jti.clone(),
		exp: expires_at.unix_timestamp(),
		iat: issued_at.unix_timestamp(),
	};
	let mut header = Header::new(config.signing_algorithm.jwt_algorithm());

	header.kid = config.key_id.clone();

	let compact = jsonwebtoken::encode(&header, &claims, config.signing_key())
		.map_err(|source| SigningError { source })?;

	Ok(ClientAssertion { compact, jti, issued_at, expires_at })
}

fn generate_jti() -> String {
	let mut bytes = [0_u8; 16];

	rand::rng().fill_bytes(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::config::{ClientConfig, RawClientConfig};

	const RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rs384_private.pem");

	fn config() -> ClientConfig {
		ClientConfig::resolve(
			RawClientConfig::new()
				.organization("org-assert")
				.client_id("assertion-client")
				.issuer("https://as.example.com")
				.scope("system/Patient.read")
				.private_key(RSA_PRIVATE_PEM)
				.fhir_base_url("https://fhir.example.com/r4")
				.key_id("key-1"),
		)
		.expect("Assertion test configuration should resolve successfully.")
	}

	#[test]
	fn assertions_pin_the_five_minute_lifetime() {
		let audience =
			Url::parse("https://as.example.com/token").expect("Audience URL should parse.");
		let assertion = sign_assertion(&config(), &audience)
			.expect("Signing should succeed with a validated key.");

		assert_eq!(assertion.expires_at - assertion.issued_at, ASSERTION_LIFETIME);
		assert_eq!(assertion.compact().split('.').count(), 3);
	}

	#[test]
	fn consecutive_assertions_carry_distinct_jti_values() {
		let audience =
			Url::parse("https://as.example.com/token").expect("Audience URL should parse.");
		let config = config();
		let first = sign_assertion(&config, &audience).expect("First signing should succeed.");
		let second = sign_assertion(&config, &audience).expect("Second signing should succeed.");

		assert_ne!(first.jti, second.jti);
	}

	#[test]
	fn jti_carries_at_least_128_random_bits() {
		let jti = generate_jti();

		// 16 bytes base64url without padding.
		assert_eq!(jti.len(), 22);
	}

	#[test]
	fn debug_redacts_the_compact_serialization() {
		let audience =
			Url::parse("https://as.example.com/token").expect("Audience URL should parse.");
		let assertion =
			sign_assertion(&config(), &audience).expect("Signing should succeed for Debug test.");
		let rendered = format!("{assertion:?}");

		assert!(!rendered.contains(assertion.compact()));
		assert!(rendered.contains("<redacted>"));
	}
}
