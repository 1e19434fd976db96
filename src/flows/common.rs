//! Shared helpers for flow implementations (cached-request state, singleflight guards).

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	exchange::TransportErrorMapper,
	flows::SmartClient,
	http::TokenHttpClient,
	store::StoreKey,
};

/// Caller-side knobs for one access-token request.
///
/// The default request reuses any cached record whose (skew-adjusted) expiry lies in the
/// future; `force` bypasses the cache, which is what a route handler does after the resource
/// server rejected a token the broker still considered valid.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessRequest {
	/// Forces cache bypass when true.
	pub force: bool,
}
impl AccessRequest {
	/// Creates a default request.
	pub fn new() -> Self {
		Self::default()
	}

	/// Forces the client to bypass cache checks.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the force flag.
	pub fn with_force(mut self, force: bool) -> Self {
		self.force = force;

		self
	}

	/// Determines whether the cached record must be replaced.
	pub fn should_refresh(&self, record: &TokenRecord, now: OffsetDateTime) -> bool {
		self.force || record.is_revoked() || record.is_expired_at(now)
	}
}

/// Returns (and creates on demand) the singleflight guard for a store key.
pub(crate) fn flow_guard<C, M>(client: &SmartClient<C, M>, key: &StoreKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = client.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}
