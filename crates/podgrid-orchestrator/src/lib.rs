//! podgrid-orchestrator: reconciles desired pod state with containers on
//! engine hosts.
//!
//! The [`Orchestrator`] owns no durable state. Every operation consults the
//! [`NodeRegistry`](podgrid_scheduler::NodeRegistry) for placement, the
//! [`Discovery`](podgrid_discovery::Discovery) registry for bookkeeping,
//! and leases a per-host engine from the
//! [`EnginePool`](podgrid_engine::EnginePool) for the actual work.
//!
//! ```text
//! apply:   register pod → allocate port → pick host → create → register container
//! remove:  unregister pod → list (scan fleet if empty) → delete → unregister
//! delete:  unregister → delete
//! rebuild: delete → unregister → apply
//! ```

pub mod error;
pub mod fleet;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Applied, Orchestrator, RemovalReport};
