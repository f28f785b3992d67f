//! Instance name generation.

use uuid::Uuid;

/// Prefix for every name the scaler allocates.
pub const NAME_PREFIX: &str = "agent";

/// A fresh `agent-<12 hex>` name.
pub fn generate_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{NAME_PREFIX}-{}", &id[..12])
}
