//! Orchestrator error types.

use podgrid_engine::EngineError;
use podgrid_state::StateError;
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid pod: {0}")]
    InvalidPod(String),

    #[error("invalid node address: {0}")]
    InvalidNode(String),

    #[error("state store error: {0}")]
    Store(#[from] StateError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl OrchestratorError {
    /// Absent from the registry, or gone from its engine.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Engine(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
