use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// The full persisted state: every block in chain order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
}

/// Load/save port the ledger persists through.
///
/// `save` replaces the whole stored representation. Implementations must
/// never leave a half-written snapshot behind.
pub trait ChainStore: Send + Sync {
    /// Returns the last saved snapshot, or `None` if nothing was ever saved
    fn load(&self) -> Result<Option<ChainSnapshot>, StorageError>;

    /// Overwrites the stored snapshot
    fn save(&self, snapshot: &ChainSnapshot) -> Result<(), StorageError>;
}

/// A JSON document on disk, replaced by write-temp-then-rename
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "chain.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ChainStore for JsonFileStore {
    fn load(&self) -> Result<Option<ChainSnapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?;

        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &ChainSnapshot) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path)?;

        debug!(
            "Wrote {} blocks ({} bytes) to {}",
            snapshot.chain.len(),
            data.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// A sled database holding one bincode record per block, keyed by index
pub struct SledStore {
    db: Db,
    blocks: Tree,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;

        Ok(Self { db, blocks })
    }
}

impl ChainStore for SledStore {
    fn load(&self) -> Result<Option<ChainSnapshot>, StorageError> {
        let mut chain = Vec::new();

        // Big-endian keys iterate in index order.
        for entry in self.blocks.iter() {
            let (_, value) = entry?;
            let block: Block = bincode::deserialize(&value)
                .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
            chain.push(block);
        }

        if chain.is_empty() {
            return Ok(None);
        }

        Ok(Some(ChainSnapshot { chain }))
    }

    fn save(&self, snapshot: &ChainSnapshot) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        for key in self.blocks.iter().keys() {
            batch.remove(key?);
        }

        for block in &snapshot.chain {
            let value = bincode::serialize(block)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.insert(block.index.to_be_bytes().to_vec(), value);
        }

        self.blocks.apply_batch(batch)?;
        self.db.flush()?;

        info!("Saved {} blocks to sled", snapshot.chain.len());
        Ok(())
    }
}

/// Keeps the snapshot in memory; for tests and throwaway nodes
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<ChainSnapshot>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an already saved snapshot
    pub fn with_snapshot(snapshot: ChainSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Makes subsequent saves fail, simulating an unavailable backend
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The snapshot as last saved
    pub fn snapshot(&self) -> Option<ChainSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChainStore for MemoryStore {
    fn load(&self) -> Result<Option<ChainSnapshot>, StorageError> {
        Ok(self.snapshot())
    }

    fn save(&self, snapshot: &ChainSnapshot) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store rejects writes".to_string()));
        }

        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Address, Transaction};
    use tempfile::tempdir;

    fn sample_snapshot() -> ChainSnapshot {
        let genesis = Block::genesis();
        let mut block = Block::new(
            1,
            vec![
                Transaction::reward(Address("miner".to_string()), 100.0),
                Transaction::reward(Address("other".to_string()), 0.1 + 0.2),
            ],
            genesis.hash.clone(),
        );
        block.mine(1);

        ChainSnapshot {
            chain: vec![genesis, block],
        }
    }

    #[test]
    fn test_json_store_missing_file_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_json_store_is_lossless() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("chain.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.chain[1].hash, loaded.chain[1].compute_hash());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_json_store_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let shorter = ChainSnapshot {
            chain: vec![snapshot.chain[0].clone()],
        };
        store.save(&shorter).unwrap();

        assert_eq!(store.load().unwrap().unwrap().chain.len(), 1);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(&path, "{ not json").unwrap();

        let result = JsonFileStore::new(&path).load();
        assert!(matches!(result, Err(StorageError::DeserializationError(_))));
    }

    #[test]
    fn test_sled_store_round_trip_and_replace() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        assert!(store.load().unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), snapshot);

        let shorter = ChainSnapshot {
            chain: vec![snapshot.chain[0].clone()],
        };
        store.save(&shorter).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), shorter);
    }

    #[test]
    fn test_memory_store_can_fail_saves() {
        let store = MemoryStore::new();
        store.set_fail_saves(true);

        assert!(store.save(&sample_snapshot()).is_err());
        assert!(store.load().unwrap().is_none());

        store.set_fail_saves(false);
        store.save(&sample_snapshot()).unwrap();
        assert!(store.load().unwrap().is_some());
    }
}
