//! Token family, record, and secret models.

pub mod family;
pub mod record;
pub mod secret;
