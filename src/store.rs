//! Storage contracts and the built-in in-memory token store.
//!
//! Records are keyed by the *requested* scope's fingerprint, never the granted one, so cache
//! lookups stay stable even when an authorization server narrows the grant.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenFamily, TokenRecord},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for cached token state.
///
/// The in-process [`MemoryStore`] is the default; the trait is the seam for sharing token
/// state across processes. Implementations must tolerate concurrent callers—the coordinator
/// serializes writers per key, but distinct keys proceed in parallel.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the record stored under the key.
	fn save(&self, key: StoreKey, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Fetches the record stored under the key, if present.
	fn fetch<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Atomically rotates a refresh token if the expected secret matches.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Marks the stored record as revoked at the provided instant.
	fn revoke<'a>(
		&'a self,
		key: &'a StoreKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but the expected refresh secret did not match.
	RefreshMismatch,
	/// No record matched the provided key.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying stored token state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
	/// Token family component (organization/client).
	pub family: TokenFamily,
	/// Fingerprint of the requested scope set.
	pub scope_fingerprint: String,
}
impl StoreKey {
	/// Builds a key from the family and the requested scope set.
	pub fn new(family: &TokenFamily, scope: &ScopeSet) -> Self {
		Self { family: family.clone(), scope_fingerprint: scope.fingerprint() }
	}
}
