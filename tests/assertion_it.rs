// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
// self
use smart_backend_broker::{
	assertion::{self, ASSERTION_LIFETIME},
	config::{ClientConfig, RawClientConfig},
	url::Url,
};

const RSA_PRIVATE_PEM: &str = include_str!("fixtures/rs384_private.pem");
const RSA_PUBLIC_PEM: &str = include_str!("fixtures/rs384_public.pem");
const ES384_PRIVATE_PEM: &str = include_str!("fixtures/es384_private.pem");
const ES384_PUBLIC_PEM: &str = include_str!("fixtures/es384_public.pem");
const CLIENT_ID: &str = "assertion-backend-client";
const TOKEN_ENDPOINT: &str = "https://as.example.com/oauth2/token";

#[derive(Debug, Deserialize)]
struct DecodedClaims {
	iss: String,
	sub: String,
	aud: String,
	jti: String,
	exp: i64,
	iat: i64,
}

fn build_config(algorithm: &str, private_key: &str) -> ClientConfig {
	ClientConfig::resolve(
		RawClientConfig::new()
			.organization("org-assertions")
			.client_id(CLIENT_ID)
			.issuer("https://as.example.com")
			.scope("system/Patient.read")
			.private_key(private_key)
			.fhir_base_url("https://fhir.example.com/r4")
			.signing_algorithm(algorithm)
			.key_id("integration-key"),
	)
	.expect("Assertion test configuration should resolve successfully.")
}

fn decode(assertion: &str, algorithm: Algorithm, public_pem: &str) -> DecodedClaims {
	let key = match algorithm {
		Algorithm::ES384 => DecodingKey::from_ec_pem(public_pem.as_bytes()),
		_ => DecodingKey::from_rsa_pem(public_pem.as_bytes()),
	}
	.expect("Public key fixture should decode successfully.");
	let mut validation = Validation::new(algorithm);

	validation.set_audience(&[TOKEN_ENDPOINT]);
	validation.set_issuer(&[CLIENT_ID]);

	jsonwebtoken::decode::<DecodedClaims>(assertion, &key, &validation)
		.expect("A freshly signed assertion should verify under the public key.")
		.claims
}

#[test]
fn rs384_assertions_verify_and_carry_the_mandated_claims() {
	let config = build_config("RS384", RSA_PRIVATE_PEM);
	let audience = Url::parse(TOKEN_ENDPOINT).expect("Audience URL should parse.");
	let assertion = assertion::sign_assertion(&config, &audience)
		.expect("Signing should succeed with a validated RSA key.");
	let claims = decode(assertion.compact(), Algorithm::RS384, RSA_PUBLIC_PEM);

	assert_eq!(claims.iss, CLIENT_ID);
	assert_eq!(claims.sub, CLIENT_ID);
	assert_eq!(claims.aud, TOKEN_ENDPOINT);
	assert_eq!(claims.exp - claims.iat, ASSERTION_LIFETIME.whole_seconds());
	assert_eq!(claims.jti, assertion.jti);
}

#[test]
fn es384_assertions_verify_under_the_ec_key() {
	let config = build_config("ES384", ES384_PRIVATE_PEM);
	let audience = Url::parse(TOKEN_ENDPOINT).expect("Audience URL should parse.");
	let assertion = assertion::sign_assertion(&config, &audience)
		.expect("Signing should succeed with a validated EC key.");
	let claims = decode(assertion.compact(), Algorithm::ES384, ES384_PUBLIC_PEM);

	assert_eq!(claims.iss, CLIENT_ID);
	assert_eq!(claims.exp - claims.iat, 300);
}

#[test]
fn every_signature_carries_a_fresh_jti() {
	let config = build_config("RS384", RSA_PRIVATE_PEM);
	let audience = Url::parse(TOKEN_ENDPOINT).expect("Audience URL should parse.");
	let first = assertion::sign_assertion(&config, &audience)
		.expect("First signing should succeed.");
	let second = assertion::sign_assertion(&config, &audience)
		.expect("Second signing should succeed.");
	let first_claims = decode(first.compact(), Algorithm::RS384, RSA_PUBLIC_PEM);
	let second_claims = decode(second.compact(), Algorithm::RS384, RSA_PUBLIC_PEM);

	assert_ne!(first_claims.jti, second_claims.jti);
}

#[test]
fn the_kid_header_travels_with_the_assertion() {
	let config = build_config("RS384", RSA_PRIVATE_PEM);
	let audience = Url::parse(TOKEN_ENDPOINT).expect("Audience URL should parse.");
	let assertion = assertion::sign_assertion(&config, &audience)
		.expect("Signing should succeed for the header test.");
	let header = jsonwebtoken::decode_header(assertion.compact())
		.expect("Assertion header should decode successfully.");

	assert_eq!(header.alg, Algorithm::RS384);
	assert_eq!(header.kid.as_deref(), Some("integration-key"));
}
