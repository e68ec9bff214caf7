pub mod errors;
pub mod position;
pub mod queue;
pub mod storage;

#[cfg(test)]
mod tests;

pub use errors::{QueueError, StorageError};
pub use queue::{DurableQueue, QueueConfig};
pub use storage::{Durability, FjallStore, Storage, StorageConfig};
