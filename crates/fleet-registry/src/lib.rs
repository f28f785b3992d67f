//! fleet-registry — persistent registry of autoscaled agent instances.
//!
//! Backed by [redb](https://docs.rs/redb). Each instance is an independent
//! record keyed by its unique name; every operation runs in its own redb
//! transaction, so readers never observe a partially written record.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value column. A small
//! `meta` table holds the insertion counter that gives [`Registry::list`]
//! its insertion order (redb itself iterates in key order).
//!
//! The [`Registry`] trait is the seam the scaler and operator tooling
//! depend on; [`RedbRegistry`] is the durable implementation and is
//! `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod registry;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use registry::Registry;
pub use store::RedbRegistry;
pub use types::*;
