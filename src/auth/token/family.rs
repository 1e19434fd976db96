//! Token family classification (organization/client).

// self
use crate::{
	_prelude::*,
	auth::{ClientId, OrganizationId},
};

/// Identifies a cohesive token family for an organization/client pair.
///
/// Token state is keyed by this pair (plus the requested scope), so different organizations
/// sharing one store never observe each other's tokens.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenFamily {
	/// Organization/tenant that owns the tokens in the family.
	pub organization: OrganizationId,
	/// Backend-services client the tokens were minted for.
	pub client: ClientId,
}
impl TokenFamily {
	/// Creates a family for the provided organization and client.
	pub fn new(organization: OrganizationId, client: ClientId) -> Self {
		Self { organization, client }
	}
}
