//! Cached token records and their lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::{
		ScopeSet,
		token::{family::TokenFamily, secret::TokenSecret},
	},
};

/// Lifecycle status of a token record at some instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Issued-at instant lies in the future (severe clock skew).
	Pending,
	/// Token is currently usable.
	Active,
	/// Token passed its (skew-adjusted) expiry instant.
	Expired,
	/// Token was invalidated locally or by the authorization server.
	Revoked,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Immutable snapshot of the token state cached for one organization/client/scope.
///
/// `expires_at` is already skew-adjusted by the exchange layer: a record is usable exactly
/// while `now < expires_at`, and callers never re-apply the safety margin.
#[derive(Serialize, Deserialize, Clone)]
pub struct TokenRecord {
	/// Logical token grouping (organization/client).
	pub family: TokenFamily,
	/// Scopes that were requested; store keys derive from this set.
	pub scope: ScopeSet,
	/// Scopes the server actually granted; equals `scope` when the response omitted them.
	pub granted_scope: ScopeSet,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the authorization server issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the token exchange completed.
	pub issued_at: OffsetDateTime,
	/// Skew-adjusted expiry instant.
	pub expires_at: OffsetDateTime,
	/// Invalidation instant, if the record has been revoked.
	pub revoked_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder(family: TokenFamily, scope: ScopeSet) -> TokenRecordBuilder {
		TokenRecordBuilder {
			family,
			scope,
			granted_scope: None,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if self.revoked_at.is_some() {
			TokenStatus::Revoked
		} else if instant < self.issued_at {
			TokenStatus::Pending
		} else if instant >= self.expires_at {
			TokenStatus::Expired
		} else {
			TokenStatus::Active
		}
	}

	/// Returns `true` if the record has passed its expiry at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.status_at(instant) == TokenStatus::Expired
	}

	/// Returns `true` if the record has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Marks the record as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("family", &self.family)
			.field("scope", &self.scope)
			.field("granted_scope", &self.granted_scope)
			.field("access_token", &self.access_token)
			.field("refresh_token", &self.refresh_token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	family: TokenFamily,
	scope: ScopeSet,
	granted_scope: Option<ScopeSet>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Records the scopes the server actually granted (defaults to the requested set).
	pub fn granted_scope(mut self, scope: ScopeSet) -> Self {
		self.granted_scope = Some(scope);

		self
	}

	/// Sets the instant the exchange completed.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute (already skew-adjusted) expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = self
			.expires_at
			.or_else(|| self.expires_in.map(|delta| issued_at + delta))
			.ok_or(TokenRecordBuilderError::MissingExpiry)?;

		Ok(TokenRecord {
			granted_scope: self.granted_scope.unwrap_or_else(|| self.scope.clone()),
			family: self.family,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::auth::{ClientId, OrganizationId};

	fn family() -> TokenFamily {
		let organization =
			OrganizationId::new("org-records").expect("Organization fixture should be valid.");
		let client = ClientId::new("client-records").expect("Client fixture should be valid.");

		TokenFamily::new(organization, client)
	}

	fn scope() -> ScopeSet {
		ScopeSet::new(["system/Patient.read"])
			.expect("Scope fixture should be valid for token record tests.")
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let mut record = TokenRecord::builder(family(), scope())
			.access_token("access")
			.issued_at(datetime!(2026-03-01 09:00 UTC))
			.expires_at(datetime!(2026-03-01 09:59:30 UTC))
			.build()
			.expect("Token record builder should succeed for status transitions.");

		assert_eq!(record.status_at(datetime!(2026-03-01 08:59 UTC)), TokenStatus::Pending);
		assert_eq!(record.status_at(datetime!(2026-03-01 09:30 UTC)), TokenStatus::Active);
		assert_eq!(record.status_at(datetime!(2026-03-01 09:59:30 UTC)), TokenStatus::Expired);
		assert!(record.is_expired_at(datetime!(2026-03-01 10:30 UTC)));

		record.revoke(datetime!(2026-03-01 09:10 UTC));

		assert!(record.is_revoked());
		assert_eq!(record.status_at(datetime!(2026-03-01 09:30 UTC)), TokenStatus::Revoked);
	}

	#[test]
	fn builder_handles_relative_expiry_and_scope_default() {
		let record = TokenRecord::builder(family(), scope())
			.access_token("secret")
			.issued_at(datetime!(2026-03-01 09:00 UTC))
			.expires_in(Duration::minutes(45))
			.build()
			.expect("Token record builder should support relative expiry calculations.");

		assert_eq!(record.expires_at, datetime!(2026-03-01 09:45 UTC));
		assert_eq!(record.granted_scope, record.scope);
	}

	#[test]
	fn builder_records_narrowed_grants() {
		let requested = ScopeSet::new(["system/Patient.read", "system/Patient.write"])
			.expect("Requested scope fixture should be valid.");
		let granted =
			ScopeSet::new(["system/Patient.read"]).expect("Granted scope fixture should be valid.");
		let record = TokenRecord::builder(family(), requested.clone())
			.access_token("secret")
			.granted_scope(granted.clone())
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token record builder should accept a narrowed grant.");

		assert_eq!(record.scope, requested);
		assert_eq!(record.granted_scope, granted);
	}

	#[test]
	fn builder_enforces_required_fields() {
		let err = TokenRecord::builder(family(), scope())
			.expires_in(Duration::hours(1))
			.build()
			.expect_err("Builder should require an access token.");

		assert_eq!(err, TokenRecordBuilderError::MissingAccessToken);

		let err = TokenRecord::builder(family(), scope())
			.access_token("secret")
			.build()
			.expect_err("Builder should require an expiry.");

		assert_eq!(err, TokenRecordBuilderError::MissingExpiry);
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let record = TokenRecord::builder(family(), scope())
			.access_token("very-secret-access")
			.refresh_token("very-secret-refresh")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token record builder should succeed for the Debug test.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("very-secret-access"));
		assert!(!rendered.contains("very-secret-refresh"));
		assert!(rendered.contains("<redacted>"));
	}
}
