//! RedisStore: `KvStore` over a shared Redis server.
//!
//! This is the backend for fleets with more than one controller process:
//! every controller points at the same server and the server's per-key
//! atomicity (`SETNX`, `SADD`, `SREM`) arbitrates between them. Batches are
//! sent as a `MULTI`/`EXEC` pipeline.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::{KvStore, WriteBatch, WriteOp};

macro_rules! map_err {
    ($variant:ident) => {
        |e: redis::RedisError| StateError::$variant(e.to_string())
    };
}

/// Redis-backed store. Cheap to clone; clones share one multiplexed
/// connection that reconnects on failure.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (`redis://host:port[/db]`).
    pub async fn connect(url: &str) -> StateResult<Self> {
        let client = redis::Client::open(url).map_err(map_err!(Open))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(map_err!(Connection))?;
        info!(%url, "redis store connected");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        let mut con = self.conn();
        let value: Option<String> = con.get(key).await.map_err(map_err!(Read))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StateResult<()> {
        let mut con = self.conn();
        let _: () = con.set(key, value).await.map_err(map_err!(Write))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StateResult<bool> {
        let mut con = self.conn();
        let written: bool = con.set_nx(key, value).await.map_err(map_err!(Write))?;
        Ok(written)
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        let mut con = self.conn();
        let removed: i64 = con.del(key).await.map_err(map_err!(Write))?;
        debug!(%key, removed, "key deleted");
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> StateResult<bool> {
        let mut con = self.conn();
        let added: i64 = con.sadd(key, member).await.map_err(map_err!(Write))?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> StateResult<bool> {
        let mut con = self.conn();
        let removed: i64 = con.srem(key, member).await.map_err(map_err!(Write))?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> StateResult<Vec<String>> {
        let mut con = self.conn();
        let mut members: Vec<String> = con.smembers(key).await.map_err(map_err!(Read))?;
        members.sort();
        Ok(members)
    }

    async fn commit(&self, batch: WriteBatch) -> StateResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch {
            match op {
                WriteOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                WriteOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                WriteOp::SetAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                WriteOp::SetRemove { key, member } => {
                    pipe.srem(key, member).ignore();
                }
            }
        }
        let mut con = self.conn();
        let _: () = pipe
            .query_async(&mut con)
            .await
            .map_err(map_err!(Transaction))?;
        debug!(ops = count, "batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a live server: PODGRID_TEST_REDIS=redis://127.0.0.1:6379/15
    async fn live_store() -> Option<RedisStore> {
        let url = std::env::var("PODGRID_TEST_REDIS").ok()?;
        Some(RedisStore::connect(&url).await.unwrap())
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn redis_round_trip() {
        let Some(store) = live_store().await else {
            return;
        };
        store.delete("port.redis-test").await.unwrap();
        store.delete("c.redis-test").await.unwrap();

        assert!(store.set_if_absent("port.redis-test", "50001").await.unwrap());
        assert!(!store.set_if_absent("port.redis-test", "50002").await.unwrap());
        assert_eq!(
            store.get("port.redis-test").await.unwrap().as_deref(),
            Some("50001")
        );

        let batch = WriteBatch::new()
            .set_add("c.redis-test", "b")
            .set_add("c.redis-test", "a");
        store.commit(batch).await.unwrap();
        assert_eq!(store.set_members("c.redis-test").await.unwrap(), ["a", "b"]);

        assert!(store.delete("c.redis-test").await.unwrap());
        assert!(store.delete("port.redis-test").await.unwrap());
    }
}
