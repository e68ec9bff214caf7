use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::StorageError;
use crate::storage::Storage;


/// Switches a test flips to make the next storage calls fail.
#[derive(Default)]
pub struct Faults {
    pub get: AtomicBool,
    pub put: AtomicBool,
    pub delete: AtomicBool,
    /// Fails `put` for this key only.
    pub put_key: Mutex<Option<Vec<u8>>>,
    pub closes: AtomicUsize,
}

fn injected(op: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {} failure", op)))
}

/// In-memory [`Storage`] whose contents outlive the handle, so a test can
/// "reopen" it by building another store over the same map.
#[derive(Default, Clone)]
pub struct MemoryStore {
    pub data: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
    pub faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn reopen(&self) -> MemoryStore {
        MemoryStore {
            data: Arc::clone(&self.data),
            faults: Arc::new(Faults::default()),
        }
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if self.faults.get.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if self.faults.put.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        if self.faults.put_key.lock().unwrap().as_deref() == Some(key) {
            return Err(injected("put"));
        }
        self.data.lock().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if self.faults.delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    fn close(self) -> Result<(), StorageError> {
        self.faults.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn diagnostics(&self, name: &str) -> String {
        match name {
            "stats" => format!("keys: {}", self.data.lock().unwrap().len()),
            _ => String::new(),
        }
    }
}
