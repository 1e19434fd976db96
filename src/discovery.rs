//! Authorization-server metadata discovery with a per-issuer cache.
//!
//! Discovery is issuer-first and deterministic: `GET {issuer}/.well-known/smart-configuration`,
//! falling back to `{issuer}/.well-known/openid-configuration` only on HTTP 404. Successful
//! documents are cached per normalized issuer for the process lifetime, and concurrent first
//! lookups for one issuer share a single in-flight fetch through the same singleflight
//! discipline the token flows use. Failures are never retried here; the caller owns the retry
//! policy.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{Method, Request, header::ACCEPT},
};
// self
use crate::{
	_prelude::*,
	error::DiscoveryError,
	http::{ResponseMetadataSlot, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome},
};

/// Well-known path for SMART authorization-server metadata.
pub const SMART_CONFIGURATION_PATH: &str = ".well-known/smart-configuration";
/// Well-known fallback path for OpenID provider metadata.
pub const OPENID_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

/// Validated authorization-server metadata the broker cares about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
	/// Token endpoint used for every grant.
	pub token_endpoint: Url,
	/// Authorization endpoint, when advertised (unused by backend services).
	pub authorization_endpoint: Option<Url>,
	/// Introspection endpoint, when advertised.
	pub introspection_endpoint: Option<Url>,
	/// Revocation endpoint, when advertised.
	pub revocation_endpoint: Option<Url>,
}

/// Wire shape of a `.well-known` document; only `token_endpoint` is load-bearing.
#[derive(Debug, Deserialize)]
struct WireDiscoveryDocument {
	token_endpoint: Option<String>,
	authorization_endpoint: Option<String>,
	introspection_endpoint: Option<String>,
	revocation_endpoint: Option<String>,
}

/// Per-issuer discovery cache with singleflight population.
///
/// The cache is append-only: a fetched document lives for the process lifetime. Callers that
/// need to react to rotated endpoints construct a fresh cache (rotation invalidates the whole
/// [`crate::config::ClientConfig`] anyway).
pub struct DiscoveryCache<C>
where
	C: ?Sized + TokenHttpClient,
{
	http_client: Arc<C>,
	documents: RwLock<HashMap<String, DiscoveryDocument>>,
	guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl<C> DiscoveryCache<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates an empty cache on top of the provided transport.
	pub fn new(http_client: impl Into<Arc<C>>) -> Self {
		Self {
			http_client: http_client.into(),
			documents: RwLock::new(HashMap::new()),
			guards: Mutex::new(HashMap::new()),
		}
	}

	/// Returns the document for the issuer, fetching it on first use.
	///
	/// A cached entry is returned without any network call; a miss performs exactly one fetch
	/// even under concurrent first use.
	pub async fn lookup(&self, issuer: &Url) -> Result<DiscoveryDocument, DiscoveryError> {
		let key = normalize_issuer(issuer);

		if let Some(document) = self.documents.read().get(&key) {
			return Ok(document.clone());
		}

		let guard = self.guard(&key);
		let _singleflight = guard.lock().await;

		// A concurrent waiter may have populated the entry while we queued on the guard.
		if let Some(document) = self.documents.read().get(&key) {
			return Ok(document.clone());
		}

		obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

		let result = self.fetch(issuer).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Failure),
		}

		let document = result?;

		self.documents.write().insert(key, document.clone());

		Ok(document)
	}

	/// Returns the cached document for the issuer without touching the network.
	pub fn cached(&self, issuer: &Url) -> Option<DiscoveryDocument> {
		self.documents.read().get(&normalize_issuer(issuer)).cloned()
	}

	async fn fetch(&self, issuer: &Url) -> Result<DiscoveryDocument, DiscoveryError> {
		let smart_url = well_known_url(issuer, SMART_CONFIGURATION_PATH);
		let wire = match self.fetch_document(&smart_url).await {
			Err(DiscoveryError::Http { status: 404, .. }) => {
				let openid_url = well_known_url(issuer, OPENID_CONFIGURATION_PATH);

				self.fetch_document(&openid_url).await?
			},
			other => other?,
		};

		resolve_document(issuer, wire)
	}

	async fn fetch_document(&self, url: &Url) -> Result<WireDiscoveryDocument, DiscoveryError> {
		let request = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())?;
		let handle = self.http_client.with_metadata(ResponseMetadataSlot::default());
		let response = handle.call(request).await.map_err(DiscoveryError::network)?;
		let status = response.status();

		if !status.is_success() {
			return Err(DiscoveryError::Http { status: status.as_u16(), url: url.to_string() });
		}

		let body = response.into_body();
		let mut deserializer = serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| DiscoveryError::Parse { source })
	}

	fn guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}

fn resolve_document(
	issuer: &Url,
	wire: WireDiscoveryDocument,
) -> Result<DiscoveryDocument, DiscoveryError> {
	let token_endpoint = wire
		.token_endpoint
		.ok_or_else(|| DiscoveryError::MissingTokenEndpoint { issuer: issuer.to_string() })?;
	let token_endpoint = Url::parse(&token_endpoint)
		.map_err(|source| DiscoveryError::InvalidTokenEndpoint { source })?;

	Ok(DiscoveryDocument {
		token_endpoint,
		authorization_endpoint: parse_optional(wire.authorization_endpoint),
		introspection_endpoint: parse_optional(wire.introspection_endpoint),
		revocation_endpoint: parse_optional(wire.revocation_endpoint),
	})
}

fn parse_optional(value: Option<String>) -> Option<Url> {
	value.as_deref().and_then(|raw| Url::parse(raw).ok())
}

/// Normalizes an issuer for cache keying: scheme + host + path, trailing slash stripped.
fn normalize_issuer(issuer: &Url) -> String {
	let mut url = issuer.clone();

	url.set_query(None);
	url.set_fragment(None);

	url.as_str().trim_end_matches('/').to_owned()
}

fn well_known_url(issuer: &Url, suffix: &str) -> Url {
	let mut url = issuer.clone();
	let path = issuer.path().trim_end_matches('/');

	url.set_path(&format!("{path}/{suffix}"));
	url.set_query(None);
	url.set_fragment(None);

	url
}
