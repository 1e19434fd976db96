// crates.io
use time::{Duration, OffsetDateTime};
// self
use smart_backend_broker::{
	auth::{ClientId, OrganizationId, ScopeSet, TokenFamily, TokenRecord},
	store::{CompareAndSwapOutcome, MemoryStore, StoreKey, TokenStore},
};

fn family(tag: &str) -> TokenFamily {
	let organization = OrganizationId::new(format!("org-{tag}"))
		.expect("Organization identifier should be valid for store tests.");
	let client = ClientId::new(format!("client-{tag}"))
		.expect("Client identifier should be valid for store tests.");

	TokenFamily::new(organization, client)
}

fn scope() -> ScopeSet {
	ScopeSet::new(["system/Patient.read"]).expect("Scope fixture should be valid for store tests.")
}

fn record(family: TokenFamily, access: &str, refresh: Option<&str>) -> TokenRecord {
	let issued = OffsetDateTime::now_utc();
	let mut builder = TokenRecord::builder(family, scope())
		.access_token(access)
		.issued_at(issued)
		.expires_at(issued + Duration::hours(1));

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Record fixture should build successfully.")
}

#[tokio::test]
async fn save_and_fetch_round_trip() {
	let store = MemoryStore::default();
	let family = family("round-trip");
	let key = StoreKey::new(&family, &scope());

	assert!(
		store.fetch(&key).await.expect("Fetch should succeed on an empty store.").is_none(),
		"An empty store must miss.",
	);

	store
		.save(key.clone(), record(family, "round-trip-access", None))
		.await
		.expect("Save should succeed.");

	let fetched = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed after save.")
		.expect("Saved record should be present.");

	assert_eq!(fetched.access_token.expose(), "round-trip-access");
}

#[tokio::test]
async fn compare_and_swap_rotates_only_on_matching_refresh() {
	let store = MemoryStore::default();
	let family = family("cas");
	let key = StoreKey::new(&family, &scope());

	store
		.save(key.clone(), record(family.clone(), "old-access", Some("old-refresh")))
		.await
		.expect("Seeding the store should succeed.");

	let replacement = record(family.clone(), "new-access", Some("new-refresh"));
	let mismatch = store
		.compare_and_swap_refresh(&key, Some("wrong-refresh"), replacement.clone())
		.await
		.expect("CAS call should succeed.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

	let untouched = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed after mismatch.")
		.expect("Record should remain present after mismatch.");

	assert_eq!(untouched.access_token.expose(), "old-access");

	let updated = store
		.compare_and_swap_refresh(&key, Some("old-refresh"), replacement)
		.await
		.expect("CAS call should succeed.");

	assert_eq!(updated, CompareAndSwapOutcome::Updated);

	let rotated = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed after rotation.")
		.expect("Rotated record should be present.");

	assert_eq!(rotated.access_token.expose(), "new-access");
	assert_eq!(
		rotated.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("new-refresh"),
	);
}

#[tokio::test]
async fn compare_and_swap_reports_missing_records() {
	let store = MemoryStore::default();
	let family = family("cas-missing");
	let key = StoreKey::new(&family, &scope());
	let outcome = store
		.compare_and_swap_refresh(&key, Some("any"), record(family, "access", Some("refresh")))
		.await
		.expect("CAS call should succeed.");

	assert_eq!(outcome, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn revoke_marks_the_stored_record() {
	let store = MemoryStore::default();
	let family = family("revoke");
	let key = StoreKey::new(&family, &scope());

	store
		.save(key.clone(), record(family, "revocable-access", None))
		.await
		.expect("Seeding the store should succeed.");

	let revoked = store
		.revoke(&key, OffsetDateTime::now_utc())
		.await
		.expect("Revoke should succeed.")
		.expect("Revoking an existing record should return it.");

	assert!(revoked.is_revoked());

	let fetched = store
		.fetch(&key)
		.await
		.expect("Fetch should succeed after revocation.")
		.expect("Revoked record should remain present.");

	assert!(fetched.is_revoked());
}

#[tokio::test]
async fn distinct_scopes_key_distinct_records() {
	let store = MemoryStore::default();
	let family = family("scopes");
	let narrow = ScopeSet::new(["system/Patient.read"])
		.expect("Narrow scope fixture should be valid.");
	let wide = ScopeSet::new(["system/Patient.read", "system/Patient.write"])
		.expect("Wide scope fixture should be valid.");
	let narrow_key = StoreKey::new(&family, &narrow);
	let wide_key = StoreKey::new(&family, &wide);

	store
		.save(narrow_key.clone(), record(family, "narrow-access", None))
		.await
		.expect("Save should succeed.");

	assert!(
		store
			.fetch(&wide_key)
			.await
			.expect("Fetch should succeed for the unrelated key.")
			.is_none(),
		"A different scope set must not alias the cached record.",
	);
	assert!(
		store.fetch(&narrow_key).await.expect("Fetch should succeed.").is_some(),
	);
}
