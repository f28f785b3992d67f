//! RedbRegistry — redb-backed instance registry.
//!
//! Every operation opens its own redb transaction. Writes check their
//! precondition (absent name, existing record, legal transition) inside
//! the same write transaction that applies them, so concurrent writers
//! cannot interleave between check and write.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `RegistryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RegistryError::$variant(e.to_string())
    };
}

/// Thread-safe instance registry backed by redb.
#[derive(Clone)]
pub struct RedbRegistry {
    db: Arc<Database>,
}

impl RedbRegistry {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!(?path, "instance registry opened");
        Ok(registry)
    }

    /// Create an ephemeral in-memory registry (for testing and dry runs).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!("in-memory instance registry opened");
        Ok(registry)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> RegistryResult<Instance> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

impl Registry for RedbRegistry {
    fn create(&self, instance: &Instance) -> RegistryResult<Instance> {
        if !matches!(
            instance.state,
            InstanceState::Pending | InstanceState::Creating
        ) {
            return Err(RegistryError::InvalidInitialState {
                name: instance.name.clone(),
                state: instance.state,
            });
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let exists = table
                .get(instance.name.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if exists {
                return Err(RegistryError::DuplicateName(instance.name.clone()));
            }

            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let seq = meta
                .get(NEXT_SEQ)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            meta.insert(NEXT_SEQ, seq + 1).map_err(map_err!(Write))?;

            let mut stored = instance.clone();
            stored.seq = seq;
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(stored.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %stored.name, state = %stored.state, seq = stored.seq, "instance created");
        Ok(stored)
    }

    fn update(&self, instance: &Instance) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let current = match table.get(instance.name.as_str()).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(RegistryError::NotFound(instance.name.clone())),
            };

            if !current.state.can_transition_to(instance.state) {
                return Err(RegistryError::InvalidTransition {
                    name: instance.name.clone(),
                    from: current.state,
                    to: instance.state,
                });
            }

            let mut next = instance.clone();
            next.seq = current.seq;
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(next.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %instance.name, state = %instance.state, "instance updated");
        Ok(())
    }

    fn find(&self, name: &str) -> RegistryResult<Instance> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    fn list(&self) -> RegistryResult<Vec<Instance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        results.sort_by_key(|inst| inst.seq);
        Ok(results)
    }

    fn delete(&self, name: &str) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        if !existed {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, "instance deleted");
        Ok(())
    }
}
