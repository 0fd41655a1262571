use crate::event::EventError;
use crate::labels::DetectError;
use crate::producer::PublishError;
use crate::record::RecordError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by a pipeline stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("{failed} of {total} batch elements failed")]
    BatchFailed { failed: usize, total: usize },
}

impl StageError {
    /// Input problems that redelivery cannot fix
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, StageError::Event(_) | StageError::Record(_))
    }
}
