//! Worker runtime errors

use thiserror::Error;

use assigner::AssignerError;
use checkpoint_store::CheckpointError;
use message_bus::BusError;
use queue_store::QueueStoreError;

use crate::loader::LoaderError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Queue(#[from] QueueStoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Assigner(#[from] AssignerError),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}
