//! Key-value storage backends.
//!
//! - [`InMemoryStore`]: ephemeral, for tests and embedded hosts
//! - [`FileStore`]: a single JSON document of hex keys and values, written
//!   on [`StorageBackend::flush`]
//!
//! [`TypedStore`] layers bincode values over any backend.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Key type for storage operations
pub type StorageKey = Vec<u8>;

/// Value type for storage operations
pub type StorageValue = Vec<u8>;

type Map = HashMap<StorageKey, StorageValue>;

/// Trait for storage backends
pub trait StorageBackend: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>>;

    /// Set a value for a key
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key, returning whether it existed
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// List all keys with a given prefix, sorted
    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>>;

    /// Persist pending writes
    fn flush(&self) -> Result<()>;

    /// Remove everything
    fn clear(&self) -> Result<()>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

fn read(lock: &RwLock<Map>) -> Result<RwLockReadGuard<'_, Map>> {
    lock.read().map_err(|_| Error::Lock)
}

fn write(lock: &RwLock<Map>) -> Result<RwLockWriteGuard<'_, Map>> {
    lock.write().map_err(|_| Error::Lock)
}

fn sorted_with_prefix(map: &Map, prefix: &[u8]) -> Vec<StorageKey> {
    let mut keys: Vec<StorageKey> = map
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect();
    keys.sort();
    keys
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Map>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        Ok(read(&self.data)?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        write(&self.data)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(write(&self.data)?.remove(key).is_some())
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        Ok(sorted_with_prefix(&*read(&self.data)?, prefix))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        write(&self.data)?.clear();
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON file storage: `<dir>/data.json`, cached in memory between flushes
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    cache: RwLock<Map>,
    dirty: AtomicBool,
}

impl FileStore {
    /// Open (or create) a store in `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create storage directory: {}", e)))?;

        let store = Self {
            dir,
            cache: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        };
        store.load()?;
        Ok(store)
    }

    /// Path of the data file
    pub fn data_path(&self) -> PathBuf {
        self.dir.join("data.json")
    }

    fn load(&self) -> Result<()> {
        let path = self.data_path();
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("Failed to read data file: {}", e)))?;
        let encoded: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| Error::Deserialization(format!("Failed to parse data file: {}", e)))?;

        let mut cache = write(&self.cache)?;
        for (k, v) in encoded {
            let key = hex::decode(&k)
                .map_err(|e| Error::Deserialization(format!("Invalid key in storage: {}", e)))?;
            let value = hex::decode(&v)
                .map_err(|e| Error::Deserialization(format!("Invalid value in storage: {}", e)))?;
            cache.insert(key, value);
        }
        debug!(path = %path.display(), entries = cache.len(), "Loaded file store");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let encoded: BTreeMap<String, String> = read(&self.cache)?
            .iter()
            .map(|(k, v)| (hex::encode(k), hex::encode(v)))
            .collect();
        let content = serde_json::to_string_pretty(&encoded)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        // Write beside the target, then rename over it
        let path = self.data_path();
        let tmp = self.dir.join("data.json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| Error::Storage(format!("Failed to write data file: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("Failed to replace data file: {}", e)))?;

        self.dirty.store(false, Ordering::SeqCst);
        debug!(path = %path.display(), entries = encoded.len(), "Flushed file store");
        Ok(())
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        Ok(read(&self.cache)?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        write(&self.cache)?.insert(key.to_vec(), value.to_vec());
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let existed = write(&self.cache)?.remove(key).is_some();
        if existed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(existed)
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        Ok(sorted_with_prefix(&*read(&self.cache)?, prefix))
    }

    fn flush(&self) -> Result<()> {
        if self.dirty.load(Ordering::SeqCst) {
            self.persist()?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        write(&self.cache)?.clear();
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPED STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Bincode-encoded values over a byte backend
pub struct TypedStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Wrap a backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        self.backend
            .get(key)?
            .map(|data| {
                bincode::deserialize(&data).map_err(|e| {
                    Error::Deserialization(format!("Failed to deserialize value: {}", e))
                })
            })
            .transpose()
    }

    /// Set a typed value
    pub fn set<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = bincode::serialize(value)
            .map_err(|e| Error::Serialization(format!("Failed to serialize value: {}", e)))?;
        self.backend.set(key, &data)
    }

    /// Every value under `prefix`, in key order
    pub fn values_with_prefix<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<(StorageKey, T)>> {
        let mut out = Vec::new();
        for key in self.backend.list_prefix(prefix)? {
            if let Some(value) = self.get(&key)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Delete a value
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.backend.delete(key)
    }

    /// Delete every key under `prefix`
    pub fn delete_prefix(&self, prefix: &[u8]) -> Result<usize> {
        let keys = self.backend.list_prefix(prefix)?;
        for key in &keys {
            self.backend.delete(key)?;
        }
        Ok(keys.len())
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PREFIXES
// ═══════════════════════════════════════════════════════════════════════════════

/// Key prefixes for the persisted layout
pub mod prefixes {
    /// Vault-wide state (`vault:state`)
    pub const VAULT: &[u8] = b"vault:";
    /// Per-account positions (`acct:<id>`)
    pub const ACCOUNT: &[u8] = b"acct:";
    /// Pending deposits (`pend:<id be>`)
    pub const PENDING: &[u8] = b"pend:";
    /// Depositor index (`didx:<account>`)
    pub const DEPOSITOR_INDEX: &[u8] = b"didx:";
    /// Tranche pools (`tranche:<name>`)
    pub const TRANCHE: &[u8] = b"tranche:";
    /// Configuration (`cfg:vault`)
    pub const CONFIG: &[u8] = b"cfg:";
}

/// Create a key with a prefix
pub fn make_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(prefix.len() + key.len());
    result.extend_from_slice(prefix);
    result.extend_from_slice(key);
    result
}
