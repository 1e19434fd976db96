//! Thread-safe in-memory [`TokenStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, token::secret::TokenSecret},
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, StoreKey, TokenStore},
};

/// In-process storage backend; the default cache for a broker running in one process.
///
/// Cloning shares the underlying map, so one store can back many broker clients. All
/// operations complete synchronously under a `parking_lot` lock and return ready futures.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<StoreKey, TokenRecord>>>);
impl TokenStore for MemoryStore {
	fn save(&self, key: StoreKey, record: TokenRecord) -> StoreFuture<'_, ()> {
		self.0.write().insert(key, record);

		ready(Ok(()))
	}

	fn fetch<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<TokenRecord>> {
		let found = self.0.read().get(key).cloned();

		ready(Ok(found))
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a StoreKey,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let mut map = self.0.write();
		let outcome = match map.get(key) {
			None => CompareAndSwapOutcome::Missing,
			Some(existing) if secrets_match(existing.refresh_token.as_ref(), expected_refresh) =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::RefreshMismatch,
		};

		if outcome == CompareAndSwapOutcome::Updated {
			map.insert(key.clone(), replacement);
		}

		ready(Ok(outcome))
	}

	fn revoke<'a>(
		&'a self,
		key: &'a StoreKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		let revoked = self.0.write().get_mut(key).map(|record| {
			record.revoke(instant);

			record.clone()
		});

		ready(Ok(revoked))
	}
}

fn secrets_match(current: Option<&TokenSecret>, expected: Option<&str>) -> bool {
	current.map(TokenSecret::expose) == expected
}

fn ready<'a, T>(value: Result<T, StoreError>) -> StoreFuture<'a, T>
where
	T: 'a + Send,
{
	Box::pin(std::future::ready(value))
}
