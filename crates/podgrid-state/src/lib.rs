//! podgrid-state: the shared store behind every podgrid registry.
//!
//! The registries never talk to a database directly. They go through the
//! [`KvStore`] trait, a small key/value + set-membership contract with
//! atomic single-key operations and an atomic multi-key [`WriteBatch`].
//!
//! # Backends
//!
//! - [`EmbeddedStore`] - redb, on disk or in memory (tests, single node).
//! - [`RedisStore`] - a shared Redis server, for a fleet of controllers.
//!
//! # Key schema
//!
//! | Key | Value |
//! |---|---|
//! | `id.<containerName>` | container id |
//! | `json.<containerId>` | `Container` JSON |
//! | `c.<podName>` | set of container ids |
//! | `pod.<podName>` | `PodSpec` JSON |
//! | `port.<podName>` | allocated host port |
//! | `nodes` | set of engine host addresses |

pub mod embedded;
pub mod error;
pub mod keys;
pub mod open;
pub mod redis_store;
pub mod store;
pub mod tables;
pub mod types;

pub use embedded::EmbeddedStore;
pub use error::{StateError, StateResult};
pub use open::open_url;
pub use redis_store::RedisStore;
pub use store::{KvStore, SharedStore, WriteBatch, WriteOp};
pub use types::*;
