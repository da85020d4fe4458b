use thiserror::Error;

use crate::backend::BackendError;
use crate::pipeline::entity::EntityId;

/// Failure taxonomy of the pipeline tracker.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected at the input boundary, before any backend call.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity {0} not found")]
    NotFound(EntityId),

    #[error("Selection limit of {max} reached")]
    LimitReached { max: usize },

    /// Transient backend failure. The optimistic mutation has already been reverted.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The incoming payload could not be mapped onto the board and was discarded whole.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl PipelineError {
    /// Maps a failed fetch onto the taxonomy: parse failures are fatal, the rest transient.
    pub fn from_fetch(err: BackendError) -> Self {
        match err {
            BackendError::Parse(e) => PipelineError::MalformedPayload(e.to_string()),
            other => PipelineError::Backend(other),
        }
    }
}
