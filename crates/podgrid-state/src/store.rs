//! The `KvStore` contract shared by every backend.
//!
//! Single-key operations are atomic on every backend. Multi-key updates go
//! through [`WriteBatch`], which each backend commits as one unit (a redb
//! write transaction, a Redis `MULTI`/`EXEC` pipeline).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StateResult;

/// Process-wide store handle, injected into every registry.
pub type SharedStore = Arc<dyn KvStore>;

/// Key/value store with set-membership support.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs (`redb`, `redis`).
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> StateResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StateResult<()>;

    /// Store `value` only if `key` is absent. Returns true if written.
    async fn set_if_absent(&self, key: &str, value: &str) -> StateResult<bool>;

    /// Delete a key of any kind. Returns true if something was removed.
    async fn delete(&self, key: &str) -> StateResult<bool>;

    /// Add a member to a set. Returns true if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> StateResult<bool>;

    /// Remove a member from a set. Returns true if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> StateResult<bool>;

    /// All members of a set, sorted. A missing set is empty.
    async fn set_members(&self, key: &str) -> StateResult<Vec<String>>;

    /// Apply every operation in `batch` atomically, in order.
    async fn commit(&self, batch: WriteBatch) -> StateResult<()>;

    /// Release backend resources. Called once at shutdown.
    async fn close(&self) -> StateResult<()> {
        Ok(())
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    Delete { key: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
}

/// Ordered group of mutations committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
