#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use smart_backend_broker::{
	_preludet::*, discovery::DiscoveryCache, error::DiscoveryError, http::ReqwestHttpClient,
};

fn build_cache() -> DiscoveryCache<ReqwestHttpClient> {
	DiscoveryCache::new(test_reqwest_http_client())
}

fn issuer(server: &MockServer) -> Url {
	Url::parse(&server.url("")).expect("Mock issuer URL should parse successfully.")
}

#[tokio::test]
async fn smart_configuration_is_fetched_and_cached() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"token_endpoint\":\"{}\",\"authorization_endpoint\":\"{}\"}}",
				server.url("/token"),
				server.url("/authorize"),
			));
		})
		.await;
	let issuer = issuer(&server);
	let first = cache.lookup(&issuer).await.expect("Initial discovery lookup should succeed.");
	let second = cache.lookup(&issuer).await.expect("Cached discovery lookup should succeed.");

	assert_eq!(first.token_endpoint.as_str(), server.url("/token"));
	assert_eq!(first, second);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_smart_configuration_falls_back_to_openid() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let smart_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(404);
		})
		.await;
	let openid_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!("{{\"token_endpoint\":\"{}\"}}", server.url("/token")));
		})
		.await;
	let document = cache
		.lookup(&issuer(&server))
		.await
		.expect("The openid-configuration fallback should succeed.");

	assert_eq!(document.token_endpoint.as_str(), server.url("/token"));

	smart_mock.assert_calls_async(1).await;
	openid_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_success_statuses_other_than_404_do_not_fall_back() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let smart_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(503);
		})
		.await;
	let openid_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!("{{\"token_endpoint\":\"{}\"}}", server.url("/token")));
		})
		.await;
	let err = cache
		.lookup(&issuer(&server))
		.await
		.expect_err("A 503 must surface instead of triggering the fallback.");

	assert!(matches!(err, DiscoveryError::Http { status: 503, .. }));
	assert!(err.is_retryable(), "Server-side discovery failures should be retryable.");

	smart_mock.assert_calls_async(1).await;
	openid_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn documents_without_token_endpoint_are_rejected() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"capabilities\":[\"client-confidential-asymmetric\"]}");
		})
		.await;
	let err = cache
		.lookup(&issuer(&server))
		.await
		.expect_err("A document without token_endpoint must be rejected.");

	assert!(matches!(err, DiscoveryError::MissingTokenEndpoint { .. }));
	assert!(!err.is_retryable(), "An incomplete document is not a transient failure.");

	mock.assert_async().await;

	// Failures are never cached; the next lookup fetches again.
	let _ = cache.lookup(&issuer(&server)).await;

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn malformed_documents_surface_parse_errors() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200).header("content-type", "application/json").body("not json");
		})
		.await;
	let err = cache
		.lookup(&issuer(&server))
		.await
		.expect_err("Malformed JSON must surface as a parse error.");

	assert!(matches!(err, DiscoveryError::Parse { .. }));

	mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_first_lookups_share_one_fetch() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!("{{\"token_endpoint\":\"{}\"}}", server.url("/token")));
		})
		.await;
	let issuer = issuer(&server);
	let (first, second) = tokio::join!(cache.lookup(&issuer), cache.lookup(&issuer));

	first.expect("First concurrent lookup should succeed.");
	second.expect("Second concurrent lookup should succeed.");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn issuers_with_trailing_slashes_share_a_cache_entry() {
	let server = MockServer::start_async().await;
	let cache = build_cache();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/smart-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!("{{\"token_endpoint\":\"{}\"}}", server.url("/token")));
		})
		.await;
	let bare = issuer(&server);
	let slashed = Url::parse(&format!("{}/", server.url("")))
		.expect("Slashed issuer URL should parse successfully.");

	cache.lookup(&bare).await.expect("Bare issuer lookup should succeed.");
	cache.lookup(&slashed).await.expect("Slashed issuer lookup should reuse the cache.");

	mock.assert_calls_async(1).await;

	assert!(cache.cached(&slashed).is_some());
}
