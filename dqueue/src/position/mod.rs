//! Read and write positions of the queue and their on-disk encoding.
//!
//! Records live under their position encoded as 8 big-endian bytes. The two
//! counters live under `_readPosition` and `_writePosition`, which are 13 and
//! 14 bytes long and so can never be mistaken for a record key.

use std::convert::TryInto;

use crate::errors::QueueError;
use crate::storage::Storage;

pub const READ_POSITION_KEY: &'static str = "_readPosition";
pub const WRITE_POSITION_KEY: &'static str = "_writePosition";

pub const POSITION_SIZE: usize = 8;

#[inline]
pub fn encode(position: u64) -> [u8; POSITION_SIZE] {
    position.to_be_bytes()
}

pub fn decode(key: &'static str, bytes: &[u8]) -> Result<u64, QueueError> {
    let raw: [u8; POSITION_SIZE] = bytes
        .try_into()
        .map_err(|_| QueueError::CorruptPosition { key, len: bytes.len() })?;
    Ok(u64::from_be_bytes(raw))
}

/// In-memory copy of the two persisted counters.
///
/// `read` is the next position to consume, `write` the position the next
/// pushed record will get. Pending records are `[read, write)`.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    pub read: u64,
    pub write: u64,
}

impl Ledger {
    /// Loads both counters, treating an absent key as 0.
    pub fn load<S: Storage>(store: &S) -> Result<Ledger, QueueError> {
        let read = Self::load_one(store, READ_POSITION_KEY)?;
        let write = Self::load_one(store, WRITE_POSITION_KEY)?;
        if read > write {
            return Err(QueueError::InconsistentPositions { read, write });
        }
        Ok(Ledger { read, write })
    }

    fn load_one<S: Storage>(store: &S, key: &'static str) -> Result<u64, QueueError> {
        match store.get(key.as_bytes()).map_err(QueueError::Io)? {
            Some(bytes) => decode(key, &bytes),
            None => Ok(0),
        }
    }

    #[inline]
    pub fn pending(&self) -> u64 {
        self.write - self.read
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read >= self.write
    }

    /// Writes `payload` at `write` and then persists `write + 1`.
    ///
    /// The in-memory counter moves only once both writes are durable.
    pub fn append<S: Storage>(&mut self, store: &mut S, payload: &[u8]) -> Result<u64, QueueError> {
        let position = self.write;
        store.put(&encode(position), payload).map_err(QueueError::Io)?;
        store
            .put(WRITE_POSITION_KEY.as_bytes(), &encode(position + 1))
            .map_err(QueueError::Io)?;
        self.write = position + 1;
        Ok(position)
    }

    /// Removes the record at `read` and persists `read + 1`.
    ///
    /// Returns `None` when the record is already gone, which happens after a
    /// crash between the delete and the counter persist. A failed delete
    /// leaves the counter where it was.
    pub fn consume<S: Storage>(&mut self, store: &mut S) -> Result<Option<Vec<u8>>, QueueError> {
        debug_assert!(!self.is_empty());
        let position = self.read;
        let key = encode(position);
        let value = store.get(&key).map_err(QueueError::Io)?;
        if value.is_some() {
            store.delete(&key).map_err(QueueError::Io)?;
        }
        store
            .put(READ_POSITION_KEY.as_bytes(), &encode(position + 1))
            .map_err(QueueError::Io)?;
        self.read = position + 1;
        Ok(value)
    }
}
