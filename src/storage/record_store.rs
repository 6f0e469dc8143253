//! Typed, prefixed record storage over the shared engine
//!
//! A `RecordStore<T>` owns one key prefix inside the single sled tree and
//! (de)serializes `T` with bincode. Keys handed to callers never carry the
//! prefix. Iteration follows sled's lexicographic order over the full key,
//! so numeric key parts must be zero padded by the caller.
//!
//! Each store has its own lock. Two stores never share one, so writes that
//! span stores (a block and its transactions) are not atomic.

use crate::error::{BlockchainError, Result};
use crate::storage::engine::Engine;
use crate::utils::{deserialize, serialize};
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Anything the store can persist
pub trait Record: bincode::Encode + bincode::Decode<()> {}

impl<T> Record for T where T: bincode::Encode + bincode::Decode<()> {}

pub struct RecordStore<T> {
    engine: Arc<Engine>,
    prefix: &'static str,
    lock: RwLock<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordStore<T> {
    pub fn new(engine: Arc<Engine>, prefix: &'static str) -> RecordStore<T> {
        RecordStore {
            engine,
            prefix,
            lock: RwLock::new(()),
            _record: PhantomData,
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip_prefix(&self, raw: &[u8]) -> Result<String> {
        let full = std::str::from_utf8(raw)
            .map_err(|e| BlockchainError::Database(format!("Non UTF-8 key in store: {e}")))?;
        Ok(full
            .strip_prefix(self.prefix)
            .unwrap_or(full)
            .to_string())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.lock.read().map_err(|_| {
            BlockchainError::Database(format!("lock for '{}' store poisoned", self.prefix))
        })
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.lock.write().map_err(|_| {
            BlockchainError::Database(format!("lock for '{}' store poisoned", self.prefix))
        })
    }

    /// Write `record` under `key`, overwriting any previous value
    pub fn put(&self, key: &str, record: &T) -> Result<()> {
        let bytes = serialize(record)?;
        let _guard = self.write_guard()?;
        self.engine.with_db(|db| {
            db.insert(self.full_key(key).as_bytes(), bytes)?;
            Ok(())
        })
    }

    /// Read the record under `key`; `NotFound` when it is absent
    pub fn get(&self, key: &str) -> Result<T> {
        let full_key = self.full_key(key);
        let bytes = {
            let _guard = self.read_guard()?;
            self.engine
                .with_db(|db| Ok(db.get(full_key.as_bytes())?))?
        };
        match bytes {
            Some(bytes) => deserialize(bytes.as_ref()),
            None => Err(BlockchainError::NotFound(full_key)),
        }
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_guard()?;
        self.engine.with_db(|db| {
            db.remove(self.full_key(key).as_bytes())?;
            Ok(())
        })
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let _guard = self.read_guard()?;
        self.engine
            .with_db(|db| Ok(db.contains_key(self.full_key(key).as_bytes())?))
    }

    /// All keys of this store in engine order, prefix stripped
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let _guard = self.read_guard()?;
        self.engine.with_db(|db| {
            let mut keys = Vec::new();
            for item in db.scan_prefix(self.prefix.as_bytes()).keys() {
                keys.push(self.strip_prefix(item?.as_ref())?);
            }
            Ok(keys)
        })
    }

    pub fn list_values(&self) -> Result<Vec<T>> {
        Ok(self
            .list_entries()?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// `(key, record)` pairs in engine order
    pub fn list_entries(&self) -> Result<Vec<(String, T)>> {
        let _guard = self.read_guard()?;
        self.engine.with_db(|db| {
            let mut entries = Vec::new();
            for item in db.scan_prefix(self.prefix.as_bytes()) {
                let (key, value) = item?;
                entries.push((self.strip_prefix(key.as_ref())?, deserialize(value.as_ref())?));
            }
            Ok(entries)
        })
    }

    pub fn count(&self) -> Result<u64> {
        let _guard = self.read_guard()?;
        self.engine.with_db(|db| {
            let mut counter = 0;
            for item in db.scan_prefix(self.prefix.as_bytes()).keys() {
                item?;
                counter += 1;
            }
            Ok(counter)
        })
    }

    /// Records whose keys fall in `[start_key, end_key)`
    pub fn get_range(&self, start_key: &str, end_key: &str) -> Result<Vec<T>> {
        if start_key >= end_key {
            return Ok(Vec::new());
        }
        let start = self.full_key(start_key);
        let end = self.full_key(end_key);
        let _guard = self.read_guard()?;
        self.engine.with_db(|db| {
            let mut records = Vec::new();
            for item in db.range(start.as_bytes()..end.as_bytes()) {
                let (_, value) = item?;
                records.push(deserialize(value.as_ref())?);
            }
            Ok(records)
        })
    }

    /// Start an atomic group of writes against this store
    pub fn batch(&self) -> Batch<'_, T> {
        Batch {
            store: self,
            inner: sled::Batch::default(),
            len: 0,
        }
    }
}

/// Accumulated puts and deletes, applied as one sled write on `commit`
pub struct Batch<'a, T: Record> {
    store: &'a RecordStore<T>,
    inner: sled::Batch,
    len: usize,
}

impl<'a, T: Record> Batch<'a, T> {
    pub fn put(&mut self, key: &str, record: &T) -> Result<()> {
        let bytes = serialize(record)?;
        self.inner.insert(self.store.full_key(key).as_bytes(), bytes);
        self.len += 1;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) {
        self.inner.remove(self.store.full_key(key).as_bytes());
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn commit(self) -> Result<()> {
        let _guard = self.store.write_guard()?;
        let inner = self.inner;
        self.store.engine.with_db(move |db| {
            db.apply_batch(inner)?;
            Ok(())
        })
    }
}
