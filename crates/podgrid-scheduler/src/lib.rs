//! podgrid-scheduler: which engine hosts exist, and where a pod goes.
//!
//! The node set lives in the shared store under the `nodes` key so every
//! controller sees the same fleet. Placement is a pure function of the
//! membership snapshot.
//!
//! ```text
//! NodeRegistry
//!   ├── SharedStore (`nodes` set)
//!   └── placement::pick (sorted snapshot → host)
//! ```

pub mod nodes;
pub mod placement;

pub use nodes::{DEFAULT_ENGINE_HOST, NodeRegistry};
