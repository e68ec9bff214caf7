use std::sync::{Condvar, Mutex, MutexGuard};

use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::errors::QueueError;
use crate::position::Ledger;
use crate::storage::{FjallStore, Storage, StorageConfig};

#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

struct State<S> {
    store: Option<S>,
    ledger: Ledger,
}

impl<S> State<S> {
    fn store(&mut self) -> Result<&mut S, QueueError> {
        self.store.as_mut().ok_or(QueueError::Closed)
    }
}

/// FIFO of byte payloads persisted in an ordered key-value store.
///
/// Every push and pop holds one mutex for its whole duration, storage I/O
/// included. `pop` parks on a condition variable while the queue is empty.
pub struct DurableQueue<S: Storage = FjallStore> {
    state: Mutex<State<S>>,
    not_empty: Condvar,
}

impl DurableQueue<FjallStore> {
    pub fn open(cfg: &QueueConfig) -> Result<Self, QueueError> {
        let store = FjallStore::open(&cfg.storage).map_err(QueueError::Open)?;
        Self::with_storage(store)
    }
}

impl<S: Storage> DurableQueue<S> {
    pub fn with_storage(store: S) -> Result<Self, QueueError> {
        let ledger = Ledger::load(&store)?;
        info!(read = ledger.read, write = ledger.write, "opened queue");
        Ok(DurableQueue {
            state: Mutex::new(State {
                store: Some(store),
                ledger,
            }),
            not_empty: Condvar::new(),
        })
    }

    #[inline]
    fn lock(&self) -> Result<MutexGuard<'_, State<S>>, QueueError> {
        Ok(self.state.lock()?)
    }

    /// Appends `payload` and returns the position it was stored at.
    ///
    /// Nothing changes in memory unless both the record and the new write
    /// position were persisted.
    pub fn push(&self, payload: &[u8]) -> Result<u64, QueueError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let store = state.store.as_mut().ok_or(QueueError::Closed)?;
        let position = state.ledger.append(store, payload)?;
        trace!(position, len = payload.len(), "pushed");
        self.not_empty.notify_one();
        Ok(position)
    }

    /// Removes the oldest record, blocking while the queue is empty.
    ///
    /// `Ok(None)` means the slot at the read position had no record (it was
    /// deleted before a crash); the slot is still consumed.
    pub fn pop(&self) -> Result<Option<Vec<u8>>, QueueError> {
        let mut guard = self.lock()?;
        loop {
            if guard.store.is_none() {
                return Err(QueueError::Closed);
            }
            if !guard.ledger.is_empty() {
                break;
            }
            guard = self.not_empty.wait(guard)?;
        }

        let state = &mut *guard;
        let position = state.ledger.read;
        let result = match state.store.as_mut() {
            Some(store) => state.ledger.consume(store),
            None => Err(QueueError::Closed),
        };
        // Hand the wakeup on if this consumer did not take the last record,
        // including when it is about to return an error.
        if !state.ledger.is_empty() {
            self.not_empty.notify_one();
        }

        match &result {
            Ok(Some(payload)) => trace!(position, len = payload.len(), "popped"),
            Ok(None) => warn!(position, "record missing at read position, skipping"),
            Err(e) => debug!(position, error = %e, "pop failed"),
        }
        result
    }

    /// Releases the storage handle. Later calls return [`QueueError::Closed`],
    /// including consumers currently parked in [`DurableQueue::pop`].
    pub fn close(&self) -> Result<(), QueueError> {
        let store = {
            let mut guard = self.lock()?;
            guard.store.take()
        };
        self.not_empty.notify_all();
        match store {
            Some(store) => {
                store.close().map_err(QueueError::Io)?;
                info!("closed queue");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Engine statistics, informational only.
    pub fn diagnostics(&self) -> Result<String, QueueError> {
        self.diagnostics_property("stats")
    }

    pub fn diagnostics_property(&self, name: &str) -> Result<String, QueueError> {
        let mut guard = self.lock()?;
        Ok(guard.store()?.diagnostics(name))
    }

    /// Current `(read, write)` positions.
    pub fn positions(&self) -> Result<(u64, u64), QueueError> {
        let guard = self.lock()?;
        Ok((guard.ledger.read, guard.ledger.write))
    }

    pub fn len(&self) -> Result<u64, QueueError> {
        Ok(self.lock()?.ledger.pending())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.lock()?.ledger.is_empty())
    }
}

impl<S: Storage> Drop for DurableQueue<S> {
    fn drop(&mut self) {
        let store = match self.state.get_mut() {
            Ok(state) => state.store.take(),
            Err(poisoned) => poisoned.into_inner().store.take(),
        };
        if let Some(store) = store {
            if let Err(e) = store.close() {
                warn!(error = %e, "failed to close storage on drop");
            }
        }
    }
}
