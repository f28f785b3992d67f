//! redb table definitions for the instance registry.

use redb::TableDefinition;

/// Instance records keyed by instance name.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Registry bookkeeping (insertion counter).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the next insertion sequence number.
pub const NEXT_SEQ: &str = "next_seq";
