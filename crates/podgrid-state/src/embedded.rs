//! EmbeddedStore: redb-backed `KvStore`.
//!
//! Used for single-node deployments (on disk) and for tests (in memory).
//! Every mutation runs in its own write transaction; redb serializes write
//! transactions, which gives `set_if_absent` its first-writer-wins
//! guarantee across concurrent callers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableMultimapTable, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{KvStore, WriteBatch, WriteOp};
use crate::tables::{SETS, VALUES};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe embedded store backed by redb.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "embedded store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(VALUES).map_err(map_err!(Table))?;
        txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` inside a write transaction and commit it.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> StateResult<T>) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let out = f(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(out)
    }

    fn apply_op(txn: &WriteTransaction, op: &WriteOp) -> StateResult<()> {
        match op {
            WriteOp::Set { key, value } => {
                let mut table = txn.open_table(VALUES).map_err(map_err!(Table))?;
                table
                    .insert(key.as_str(), value.as_str())
                    .map_err(map_err!(Write))?;
            }
            WriteOp::Delete { key } => {
                Self::delete_in(txn, key)?;
            }
            WriteOp::SetAdd { key, member } => {
                let mut table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
                table
                    .insert(key.as_str(), member.as_str())
                    .map_err(map_err!(Write))?;
            }
            WriteOp::SetRemove { key, member } => {
                let mut table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
                table
                    .remove(key.as_str(), member.as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        Ok(())
    }

    fn delete_in(txn: &WriteTransaction, key: &str) -> StateResult<bool> {
        let value_existed = {
            let mut table = txn.open_table(VALUES).map_err(map_err!(Table))?;
            table.remove(key).map_err(map_err!(Write))?.is_some()
        };
        let set_existed = {
            let mut table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
            table.remove_all(key).map_err(map_err!(Write))?.next().is_some()
        };
        Ok(value_existed || set_existed)
    }
}

#[async_trait]
impl KvStore for EmbeddedStore {
    fn backend(&self) -> &'static str {
        "redb"
    }

    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VALUES).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StateResult<()> {
        self.write(|txn| {
            let mut table = txn.open_table(VALUES).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
            Ok(())
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StateResult<bool> {
        self.write(|txn| {
            let mut table = txn.open_table(VALUES).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Ok(false);
            }
            table.insert(key, value).map_err(map_err!(Write))?;
            Ok(true)
        })
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        let existed = self.write(|txn| Self::delete_in(txn, key))?;
        debug!(%key, existed, "key deleted");
        Ok(existed)
    }

    async fn set_add(&self, key: &str, member: &str) -> StateResult<bool> {
        self.write(|txn| {
            let mut table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
            // redb reports whether the pair was already present.
            let existed = table.insert(key, member).map_err(map_err!(Write))?;
            Ok(!existed)
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> StateResult<bool> {
        self.write(|txn| {
            let mut table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
            table.remove(key, member).map_err(map_err!(Write))
        })
    }

    async fn set_members(&self, key: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_multimap_table(SETS).map_err(map_err!(Table))?;
        let mut members = Vec::new();
        for entry in table.get(key).map_err(map_err!(Read))? {
            let guard = entry.map_err(map_err!(Read))?;
            members.push(guard.value().to_string());
        }
        // redb iterates in key order already; sort anyway so every backend agrees.
        members.sort();
        Ok(members)
    }

    async fn commit(&self, batch: WriteBatch) -> StateResult<()> {
        let count = batch.len();
        self.write(|txn| {
            for op in batch.ops() {
                Self::apply_op(txn, op)?;
            }
            Ok(())
        })?;
        debug!(ops = count, "batch committed");
        Ok(())
    }
}
