use smartspend_import::FormatError;
use smartspend_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Also the answer for records owned by someone else.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Transaction description is empty after normalization; no rule can be learned")]
    EmptyDescription,
    #[error("Rule pattern must not be empty")]
    EmptyPattern,
    #[error("Job queue is closed")]
    QueueClosed,
    #[error("Job queue is full; try again later")]
    QueueFull,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => PipelineError::NotFound(what),
            StoreError::EmptyPattern => PipelineError::EmptyPattern,
            other => PipelineError::Store(other),
        }
    }
}
