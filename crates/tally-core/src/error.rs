use thiserror::Error;

use crate::app::{ConfigError, PublishError, StartupError};
use crate::domain::CodecError;
use crate::ports::{QueueError, StoreError};

/// Umbrella error for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
