//! Local key-value store consumed by the protocol.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

use crate::config::DEFAULT_MAX_VALUES;
use crate::Result;

/// Values this node holds on behalf of the network.
pub trait Storage {
    /// Returns the value stored under `key`, if any.
    fn get(&mut self, key: &[u8]) -> Option<Bytes>;

    /// Store `value` under `key`, overwriting any previous value.
    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()>;

    /// Snapshot of every stored `(key, value)` pair.
    fn items(&self) -> Vec<(Bytes, Bytes)>;
}

#[derive(Debug)]
/// In memory [Storage] that forgets the least recently used values
/// once it holds `capacity` of them.
pub struct MemoryStorage {
    values: LruCache<Bytes, Bytes>,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(
            NonZeroUsize::new(DEFAULT_MAX_VALUES).expect("DEFAULT_MAX_VALUES is NonZeroUsize"),
        );

        Self {
            values: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage::new(DEFAULT_MAX_VALUES)
    }
}

impl Storage for MemoryStorage {
    fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.values.put(key, value);

        Ok(())
    }

    fn items(&self) -> Vec<(Bytes, Bytes)> {
        self.values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
