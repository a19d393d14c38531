//! podgrid-discovery: the container/pod registry.
//!
//! Maps logical names to running instances and persists desired state:
//!
//! - pod specs under `pod.<name>`
//! - container records under `id.<name>` → `json.<id>`, indexed by pod in
//!   the `c.<pod>` set
//! - one published host port per pod under `port.<pod>`
//!
//! Container writes go through a single `WriteBatch`, so the name pointer,
//! the record and the pod membership entry appear and disappear together.

pub mod ports;
pub mod registry;

pub use ports::{EPHEMERAL_PORTS, FALLBACK_PORT};
pub use registry::Discovery;
