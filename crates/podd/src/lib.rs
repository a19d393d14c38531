//! podd: the podgrid daemon.
//!
//! Assembles the subsystems into one process:
//! - State store (redb or Redis)
//! - Node registry and discovery
//! - Engine pool (Docker or in-memory)
//! - Orchestrator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! podd serve --port 3232 --store redis://127.0.0.1:6379 --default-node tcp://10.0.0.5:2375
//! ```

pub mod config;
pub mod daemon;

pub use config::{DaemonConfig, EngineKind, FileConfig, ServeArgs};
pub use daemon::{Daemon, init_tracing, run};
