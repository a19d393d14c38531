//! Engine error types.

use std::time::Duration;

use podgrid_state::Container;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from a container engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine endpoint {host}: {reason}")]
    Endpoint { host: String, reason: String },

    #[error("engine host {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("no such container: {0}")]
    NotFound(String),

    #[error("container ID is empty")]
    MissingId,

    #[error("invalid pod spec: {0}")]
    InvalidSpec(String),

    #[error("image pull failed for {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("container create failed: {0}")]
    Create(String),

    #[error("container start failed: {0}")]
    Start(String),

    #[error("container stop failed: {0}")]
    Stop(String),

    #[error("container remove failed: {0}")]
    Remove(String),

    #[error("container restart failed: {0}")]
    Restart(String),

    #[error("container inspect failed: {0}")]
    Inspect(String),

    #[error("container list failed: {0}")]
    List(String),

    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A create that failed part-way. Carries the record describing how far it
/// got, so the caller can still persist it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CreateFailure {
    pub container: Box<Container>,
    #[source]
    pub error: EngineError,
}

impl CreateFailure {
    pub fn new(container: Container, error: EngineError) -> Self {
        Self {
            container: Box::new(container),
            error,
        }
    }
}
