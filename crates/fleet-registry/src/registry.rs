//! The registry contract.

use crate::error::RegistryResult;
use crate::types::Instance;

/// Keyed store of instance records with atomic per-record operations.
///
/// There is no partial-field update: callers read a record, derive the
/// next version (see the `mark_*` helpers on [`Instance`]) and write the
/// whole record back through [`Registry::update`]. Cross-cutting concerns
/// (metrics, auditing) wrap an inner `Registry` and implement this trait
/// themselves.
pub trait Registry: Send + Sync {
    /// Insert a new record. Fails with `DuplicateName` if the name exists.
    ///
    /// Returns the stored record with its insertion sequence assigned.
    fn create(&self, instance: &Instance) -> RegistryResult<Instance>;

    /// Replace an existing record by name. Fails with `NotFound` if absent
    /// and `InvalidTransition` if the state change is not a forward step
    /// of the lifecycle.
    fn update(&self, instance: &Instance) -> RegistryResult<()>;

    /// Look up a record by name.
    fn find(&self, name: &str) -> RegistryResult<Instance>;

    /// Snapshot of all records in insertion order.
    fn list(&self) -> RegistryResult<Vec<Instance>>;

    /// Remove a record entirely. Only used for operator purge.
    fn delete(&self, name: &str) -> RegistryResult<()>;
}
