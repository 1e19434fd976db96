//! Access-token acquisition with caching + singleflight guards.
//!
//! [`SmartClient::access_token`] is the broker's public entry point. Each call evaluates the
//! cached record for the configuration's organization/client/scope key and only talks to the
//! network when the record is missing, expired, revoked, or the caller forced a refresh. A
//! per-key singleflight guard ensures concurrent callers piggy-back on the same in-flight
//! fetch instead of stampeding the token endpoint; a failed fetch leaves the cache empty so
//! the next call re-attempts immediately (backoff belongs to the caller).
//!
//! When a cached record carries a refresh token, the `refresh_token` grant runs first—with a
//! fresh client assertion, like every token request. A stale refresh secret (`invalid_grant`)
//! revokes the cached record and falls back to one `client_credentials` attempt inside the
//! same critical section, since backend-services clients can always re-mint.

// self
use crate::{
	_prelude::*,
	assertion,
	auth::{TokenFamily, TokenRecord},
	error::{ConfigError, TokenError, TokenErrorKind},
	exchange::{ExchangeFacade, TransportErrorMapper},
	flows::{AccessRequest, SmartClient, common},
	http::TokenHttpClient,
	obs::{self, AuditEvent, FlowKind, FlowOutcome, FlowSpan},
	store::{CompareAndSwapOutcome, StoreKey},
};

impl<C, M> SmartClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable token record for this configuration, fetching on demand.
	///
	/// Cache hits return without any network call. Errors come back annotated with the
	/// organization/client identity; use [`Error::is_retryable`](crate::error::Error::is_retryable)
	/// to decide whether a retry with backoff is worthwhile.
	pub async fn access_token(&self, request: AccessRequest) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Access;

		let span = FlowSpan::new(KIND, "access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.emit_audit(KIND, FlowOutcome::Attempt, None);

		let result = span.instrument(self.acquire(request)).await;

		match &result {
			Ok(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.emit_audit(KIND, FlowOutcome::Success, None);
			},
			Err(err) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.emit_audit(KIND, FlowOutcome::Failure, Some(err.to_string()));
			},
		}

		result.map_err(|err| err.with_context(&self.config.organization, &self.config.client_id))
	}

	/// Drops the cached token state for this configuration.
	///
	/// Call this when the resource server rejected a token the broker still considered valid
	/// (clock skew, server-side revocation); the next [`access_token`](Self::access_token)
	/// call then performs a fresh fetch.
	pub async fn invalidate(&self) -> Result<Option<TokenRecord>> {
		const KIND: FlowKind = FlowKind::Invalidate;

		let key = self.store_key();
		let guard = common::flow_guard(self, &key);
		let _singleflight = guard.lock().await;
		let revoked = self
			.store
			.revoke(&key, OffsetDateTime::now_utc())
			.await
			.map_err(|err| {
				Error::from(err).with_context(&self.config.organization, &self.config.client_id)
			})?;

		self.emit_audit(KIND, FlowOutcome::Success, None);

		Ok(revoked)
	}

	async fn acquire(&self, request: AccessRequest) -> Result<TokenRecord> {
		let family = self.family();
		let key = self.store_key();
		let guard = common::flow_guard(self, &key);
		let _singleflight = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		let current = self.store.fetch(&key).await.map_err(Error::from)?;

		if let Some(record) =
			current.clone().filter(|record| !request.should_refresh(record, now))
		{
			return Ok(record);
		}

		let token_endpoint = self.resolve_token_endpoint().await?;
		let facade = <ExchangeFacade<C, M>>::from_config(
			&self.config,
			&token_endpoint,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?;
		let refresh_secret = current
			.as_ref()
			.filter(|record| !record.is_revoked())
			.and_then(|record| record.refresh_token.as_ref())
			.map(|secret| secret.expose().to_owned());

		match refresh_secret {
			Some(refresh) =>
				self.refresh_then_fallback(&facade, &token_endpoint, family, &key, &refresh, now)
					.await,
			None => self.mint(&facade, &token_endpoint, family, &key).await,
		}
	}

	/// Mints a fresh token via the `client_credentials` grant and caches it.
	async fn mint(
		&self,
		facade: &ExchangeFacade<C, M>,
		token_endpoint: &Url,
		family: TokenFamily,
		key: &StoreKey,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = async {
			let client_assertion = assertion::sign_assertion(&self.config, token_endpoint)?;
			let record =
				facade.client_credentials(family, &self.config.scope, &client_assertion).await?;

			self.store.save(key.clone(), record.clone()).await.map_err(Error::from)?;

			Ok(record)
		}
		.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Rotates the cached record via the `refresh_token` grant; a stale refresh secret falls
	/// back to one `client_credentials` attempt.
	async fn refresh_then_fallback(
		&self,
		facade: &ExchangeFacade<C, M>,
		token_endpoint: &Url,
		family: TokenFamily,
		key: &StoreKey,
		refresh: &str,
		now: OffsetDateTime,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let client_assertion = assertion::sign_assertion(&self.config, token_endpoint)?;

		match facade
			.refresh_token(family.clone(), refresh, &self.config.scope, &client_assertion)
			.await
		{
			Ok((record, rotated)) => {
				let resolved = self.apply_rotation(key, refresh, record, rotated).await?;

				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(resolved)
			},
			Err(err)
				if matches!(
					&err,
					Error::Token(TokenError::Rejected {
						kind: TokenErrorKind::InvalidGrant,
						..
					})
				) =>
			{
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				let _ = self.store.revoke(key, now).await;

				self.mint(facade, token_endpoint, family, key).await
			},
			Err(err) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				Err(err)
			},
		}
	}

	/// Applies the refreshed record to the store via compare-and-swap rotation.
	async fn apply_rotation(
		&self,
		key: &StoreKey,
		expected_refresh: &str,
		record: TokenRecord,
		rotated: Option<String>,
	) -> Result<TokenRecord> {
		let updated = if rotated.is_some() {
			record
		} else {
			// Server kept the old refresh secret; carry it forward on the new record.
			TokenRecord::builder(record.family.clone(), record.scope.clone())
				.access_token(record.access_token.expose())
				.granted_scope(record.granted_scope.clone())
				.issued_at(record.issued_at)
				.expires_at(record.expires_at)
				.refresh_token(expected_refresh)
				.build()
				.map_err(|err| Error::from(ConfigError::from(err)))?
		};
		let outcome = self
			.store
			.compare_and_swap_refresh(key, Some(expected_refresh), updated.clone())
			.await
			.map_err(Error::from)?;
		let resolved = match outcome {
			CompareAndSwapOutcome::Updated => updated,
			CompareAndSwapOutcome::Missing => {
				self.store.save(key.clone(), updated.clone()).await.map_err(Error::from)?;

				updated
			},
			CompareAndSwapOutcome::RefreshMismatch => {
				// Another writer already rotated this family; prefer its record.
				match self.store.fetch(key).await.map_err(Error::from)? {
					Some(existing) => existing,
					None => {
						self.store.save(key.clone(), updated.clone()).await.map_err(Error::from)?;

						updated
					},
				}
			},
		};

		Ok(resolved)
	}

	/// Resolves the token endpoint: explicit override first, issuer-based discovery otherwise.
	async fn resolve_token_endpoint(&self) -> Result<Url> {
		if let Some(endpoint) = &self.config.token_endpoint {
			return Ok(endpoint.clone());
		}

		let document = self.discovery.lookup(&self.config.issuer).await.map_err(Error::from)?;

		Ok(document.token_endpoint)
	}

	fn family(&self) -> TokenFamily {
		TokenFamily::new(self.config.organization.clone(), self.config.client_id.clone())
	}

	fn store_key(&self) -> StoreKey {
		StoreKey::new(&self.family(), &self.config.scope)
	}

	fn emit_audit(&self, flow: FlowKind, outcome: FlowOutcome, detail: Option<String>) {
		let mut event = AuditEvent::new(
			self.config.organization.clone(),
			self.config.client_id.clone(),
			flow,
			outcome,
		)
		.with_target(self.config.fhir_base_url.as_str());

		if let Some(detail) = detail {
			event = event.with_detail(detail);
		}

		self.audit_sink.log(event);
	}
}
