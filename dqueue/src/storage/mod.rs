use std::fs;
use std::path::{Path, PathBuf};

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StorageError;

pub static PARTITION_NAME: &'static str = "queue";

const DEFAULT_CACHE_SIZE: u64 = 16 * 1024 * 1024;

/// Point access to an ordered, persistent key-value namespace.
///
/// A successful `put` or `delete` must be durable by the time it returns.
/// `close` consumes the handle, so a store is released exactly once.
pub trait Storage: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError>;

    fn close(self) -> Result<(), StorageError>
    where
        Self: Sized;

    /// Free-form engine information for `name`; empty when the name is unknown.
    fn diagnostics(&self, name: &str) -> String;
}

/// How hard each write is pushed towards the disk before it is acknowledged.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Hand the journal to the OS without fsync. Not crash-safe.
    Buffer,
    SyncData,
    #[default]
    SyncAll,
}

impl From<Durability> for PersistMode {
    fn from(d: Durability) -> Self {
        match d {
            Durability::Buffer => PersistMode::Buffer,
            Durability::SyncData => PersistMode::SyncData,
            Durability::SyncAll => PersistMode::SyncAll,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub create_if_missing: bool,
    pub durability: Durability,
    /// Block cache size in bytes.
    pub cache_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("data/dqueue"),
            create_if_missing: true,
            durability: Durability::default(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StorageConfig {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_cache_size(mut self, cache_size: u64) -> Self {
        self.cache_size = cache_size;
        self
    }
}

/// [`Storage`] backed by a single fjall partition.
pub struct FjallStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    persist_mode: PersistMode,
}

impl FjallStore {
    pub fn open(cfg: &StorageConfig) -> Result<FjallStore, StorageError> {
        let path: &Path = &cfg.data_dir;
        if !path.exists() {
            if !cfg.create_if_missing {
                return Err(StorageError::Missing(path.to_path_buf()));
            }
            fs::create_dir_all(path)?;
        }

        let keyspace = fjall::Config::new(path)
            .cache_size(cfg.cache_size)
            .open()?;
        let partition = keyspace.open_partition(PARTITION_NAME, PartitionCreateOptions::default())?;
        debug!(path = %path.display(), durability = ?cfg.durability, "opened fjall keyspace");

        Ok(FjallStore {
            keyspace,
            partition,
            persist_mode: cfg.durability.into(),
        })
    }

    fn stats(&self) -> String {
        format!(
            "disk_space: {}\njournal_count: {}\npartition_count: {}\napproximate_len: {}",
            self.keyspace.disk_space(),
            self.keyspace.journal_count(),
            self.keyspace.partition_count(),
            self.partition.approximate_len(),
        )
    }
}

impl Storage for FjallStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.partition.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.partition.remove(key)?;
        self.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    fn close(self) -> Result<(), StorageError> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("closed fjall keyspace");
        Ok(())
    }

    fn diagnostics(&self, name: &str) -> String {
        match name {
            "stats" => self.stats(),
            "disk_space" => self.keyspace.disk_space().to_string(),
            "journal_count" => self.keyspace.journal_count().to_string(),
            "partition_count" => self.keyspace.partition_count().to_string(),
            "approximate_len" => self.partition.approximate_len().to_string(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::tempdir;

    #[test]
    fn open_without_create_fails_on_missing_dir() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let cfg = StorageConfig::new(dir.path().join("absent")).with_create_if_missing(false);
        match FjallStore::open(&cfg) {
            Err(StorageError::Missing(p)) => assert_eq!(p, cfg.data_dir),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opened a missing directory"),
        }
        assert!(!cfg.data_dir.exists());
        Ok(())
    }

    #[test]
    fn put_get_delete() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut store = FjallStore::open(&StorageConfig::new(dir.path().join("kv")))?;

        assert_eq!(store.get(b"k")?, None);
        store.put(b"k", b"v1")?;
        assert_eq!(store.get(b"k")?.as_deref(), Some(&b"v1"[..]));
        store.put(b"k", b"v2")?;
        assert_eq!(store.get(b"k")?.as_deref(), Some(&b"v2"[..]));
        store.delete(b"k")?;
        assert_eq!(store.get(b"k")?, None);
        // Deleting an absent key is not an error.
        store.delete(b"k")?;
        store.close()?;
        Ok(())
    }

    #[test]
    fn writes_survive_reopen() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let cfg = StorageConfig::new(dir.path().join("kv"));

        let mut store = FjallStore::open(&cfg)?;
        store.put(b"a", b"1")?;
        store.put(b"b", b"2")?;
        store.delete(b"a")?;
        store.close()?;

        let store = FjallStore::open(&cfg.clone().with_create_if_missing(false))?;
        assert_eq!(store.get(b"a")?, None);
        assert_eq!(store.get(b"b")?.as_deref(), Some(&b"2"[..]));
        store.close()?;
        Ok(())
    }

    #[test]
    fn diagnostics_by_name() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut store = FjallStore::open(&StorageConfig::new(dir.path().join("kv")))?;
        store.put(b"x", b"y")?;

        let stats = store.diagnostics("stats");
        assert!(stats.contains("disk_space"));
        assert!(stats.contains("approximate_len"));
        assert!(store.diagnostics("journal_count").parse::<usize>().is_ok());
        assert_eq!(store.diagnostics("no.such.property"), "");
        store.close()?;
        Ok(())
    }

    #[test]
    fn config_from_toml_fills_defaults() -> Result<(), Box<dyn Error>> {
        let cfg: StorageConfig = toml::from_str("data_dir = \"/tmp/q\"\ndurability = \"buffer\"\n")?;
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/q"));
        assert_eq!(cfg.durability, Durability::Buffer);
        assert!(cfg.create_if_missing);
        assert_eq!(cfg.cache_size, DEFAULT_CACHE_SIZE);
        Ok(())
    }
}
