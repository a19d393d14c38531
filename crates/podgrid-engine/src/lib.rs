//! podgrid-engine: drivers for the container engines podgrid places pods on.
//!
//! The orchestrator only sees the [`EngineProvider`] capability. One
//! provider talks to exactly one host and lives for one logical operation;
//! callers get it from an [`EnginePool`] as an [`EngineLease`], which also
//! holds the host's concurrency permit until it is dropped.
//!
//! # Backends
//!
//! - [`docker`] - Docker Engine API over TCP or a unix socket (bollard).
//! - [`memory`] - an in-process fleet with failure injection, for tests
//!   and dry runs.
//!
//! Every container a provider creates is labelled with its pod, host port,
//! container port and host, so a fleet scan can rebuild the registry from
//! engine state alone.

pub mod docker;
pub mod error;
pub mod labels;
pub mod memory;
pub mod pool;
pub mod provider;

pub use docker::{DockerConnector, DockerEngine};
pub use error::{CreateFailure, EngineError, EngineResult};
pub use memory::{MemoryContainer, MemoryEngine, MemoryFleet};
pub use pool::{DEFAULT_PER_HOST_LIMIT, EngineLease, EnginePool};
pub use provider::{CreateRequest, Created, EngineConnector, EngineProvider, InspectedContainer};
