//! Demonstrates acquiring a SMART backend-services access token against a mock authorization
//! server, including `.well-known` discovery and cached token reuse.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use smart_backend_broker::{
	config::{ClientConfig, RawClientConfig},
	flows::{AccessRequest, SmartClient},
	store::{MemoryStore, TokenStore},
};

const RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rs384_private.pem");

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"token_endpoint\":\"{}\"}}",
				server.url("/token"),
			));
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let config = ClientConfig::resolve(
		RawClientConfig::new()
			.organization("org-demo")
			.client_id("demo-backend-client")
			.issuer(server.url(""))
			.scope("system/Patient.read system/Observation.read")
			.private_key(RSA_PRIVATE_PEM)
			.fhir_base_url(server.url("/fhir/r4"))
			.key_id("demo-key-1"),
	)?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let client = SmartClient::new(config, store)?;
	let record = client.access_token(AccessRequest::new()).await?;

	println!("Reusable access token: {}.", record.access_token.expose());

	// The second call reuses the cached record; neither mock sees another request.
	let cached = client.access_token(AccessRequest::new()).await?;

	println!("Cached access token: {}.", cached.access_token.expose());

	discovery_mock.assert_async().await;
	token_mock.assert_async().await;

	Ok(())
}
