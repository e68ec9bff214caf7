use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures raised by a [`crate::Storage`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Engine(#[from] fjall::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("storage directory does not exist: {}", .0.display())]
    Missing(PathBuf),
}

/// Errors surfaced by [`crate::DurableQueue`].
///
/// `Open` and `Io` carry the storage error as-is; their message is the
/// storage engine's own description.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Open(StorageError),
    #[error(transparent)]
    Io(StorageError),
    #[error("position stored under {key} has {len} bytes, expected 8")]
    CorruptPosition { key: &'static str, len: usize },
    #[error("stored read position {read} is ahead of write position {write}")]
    InconsistentPositions { read: u64, write: u64 },
    #[error("queue gate was poisoned")]
    PoisonedLock,
    #[error("queue is closed")]
    Closed,
}

impl<T> From<std::sync::PoisonError<T>> for QueueError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        QueueError::PoisonedLock
    }
}
