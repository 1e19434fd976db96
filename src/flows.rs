//! High-level access-token flows powered by the client facade.

pub mod common;

mod access;

pub use common::*;

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	discovery::DiscoveryCache,
	exchange::TransportErrorMapper,
	http::TokenHttpClient,
	obs::{AuditSink, TracingAuditSink},
	store::{StoreKey, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestSmartClient = SmartClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates token acquisition for one backend-services client configuration.
///
/// The client is an explicitly constructed, dependency-injected service object: it owns the
/// HTTP transport, token store, discovery cache, and audit sink for exactly one
/// [`ClientConfig`], and [`SmartClient::access_token`] is the only entry point route handlers
/// use. Clients for different organizations share nothing mutable, so their fetches proceed
/// fully in parallel; within one client, a per-key singleflight guard keeps concurrent
/// callers from stampeding the token endpoint.
#[derive(Clone)]
pub struct SmartClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validated configuration this client acquires tokens for.
	pub config: ClientConfig,
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Token store that caches issued records.
	pub store: Arc<dyn TokenStore>,
	/// Per-issuer discovery cache; inject a shared one to deduplicate fetches across clients.
	pub discovery: Arc<DiscoveryCache<C>>,
	/// Sink receiving structured attempt/success/failure audit events.
	pub audit_sink: Arc<dyn AuditSink>,
	flow_guards: Arc<Mutex<HashMap<StoreKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> SmartClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: ClientConfig,
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let http_client = http_client.into();

		Self {
			config,
			discovery: Arc::new(DiscoveryCache::new(http_client.clone())),
			http_client,
			transport_mapper: mapper.into(),
			store,
			audit_sink: Arc::new(TracingAuditSink),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the discovery cache, e.g. with one shared across clients of the same issuer.
	pub fn with_discovery_cache(mut self, cache: Arc<DiscoveryCache<C>>) -> Self {
		self.discovery = cache;

		self
	}

	/// Replaces the audit sink (defaults to [`TracingAuditSink`]).
	pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
		self.audit_sink = sink;

		self
	}
}
#[cfg(feature = "reqwest")]
impl SmartClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a new client for the provided configuration and store.
	///
	/// The client provisions its own reqwest-backed transport bounded by the configuration's
	/// HTTP timeout, so callers do not need to pass HTTP handles explicitly.
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.http_timeout)?;

		Ok(Self::with_http_client(
			config,
			store,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for SmartClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SmartClient").field("config", &self.config).finish()
	}
}
