//! Keyed collections stored as one JSON object per vault key.
//!
//! Every operation reads the whole object, changes it, and writes it back.
//! Nothing here locks on its own except the `*_with_lock` reads, which hand
//! the held [`KeyLock`] back so the caller can finish its read-modify-write.

use std::{collections::BTreeMap, sync::Arc};

use fsvault_core::{KeyLock, Vault, VaultError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

/// Sub-key to value mapping held at one vault key.
pub type JsonMap<V> = BTreeMap<String, V>;

/// Map operations over any [`Vault`].
pub struct JsonMapStore<S: Vault> {
    store: Arc<S>,
}

impl<S: Vault> JsonMapStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load<V: DeserializeOwned>(&self, key: &str) -> Result<JsonMap<V>, VaultError> {
        match self.store.get(key) {
            Ok(bytes) if bytes.is_empty() => Ok(JsonMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| VaultError::MapPayload {
                key: key.to_string(),
                source,
            }),
            Err(err) if err.is_not_found() => Ok(JsonMap::new()),
            Err(err) => Err(err),
        }
    }

    fn save(&self, key: &str, map: &JsonMap<Value>) -> Result<(), VaultError> {
        let bytes = serde_json::to_vec(map).map_err(|source| VaultError::MapPayload {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, &bytes)
    }

    /// The whole mapping at `key`; empty when nothing is stored there.
    #[instrument(skip(self))]
    pub fn get_map<V: DeserializeOwned>(&self, key: &str) -> Result<JsonMap<V>, VaultError> {
        self.load(key)
    }

    /// Lock `key`, then read its mapping. The lock is returned still held,
    /// also when the read fails, so a broken map can be rewritten under it.
    pub fn get_map_with_lock<V: DeserializeOwned>(
        &self,
        key: &str,
    ) -> (KeyLock, Result<JsonMap<V>, VaultError>) {
        let lock = self.store.lock(key);
        let map = self.get_map(key);
        (lock, map)
    }

    /// The value at `subkey`, or `V::default()` when the map or entry is absent.
    #[instrument(skip(self))]
    pub fn get_value<V>(&self, key: &str, subkey: &str) -> Result<V, VaultError>
    where
        V: DeserializeOwned + Default,
    {
        let mut map: JsonMap<Value> = self.load(key)?;
        match map.remove(subkey) {
            Some(value) => serde_json::from_value(value).map_err(|source| VaultError::MapPayload {
                key: key.to_string(),
                source,
            }),
            None => Ok(V::default()),
        }
    }

    /// Lock `key`, then read one value. The lock is returned still held
    /// whether or not the read succeeds.
    pub fn get_value_with_lock<V>(
        &self,
        key: &str,
        subkey: &str,
    ) -> (KeyLock, Result<V, VaultError>)
    where
        V: DeserializeOwned + Default,
    {
        let lock = self.store.lock(key);
        let value = self.get_value(key, subkey);
        (lock, value)
    }

    /// Insert or overwrite `subkey`. Other entries are kept as stored.
    #[instrument(skip(self, value))]
    pub fn put_value<V: Serialize>(&self, key: &str, subkey: &str, value: V) -> Result<(), VaultError> {
        let value = serde_json::to_value(value).map_err(|source| VaultError::MapPayload {
            key: key.to_string(),
            source,
        })?;
        let mut map: JsonMap<Value> = self.load(key)?;
        map.insert(subkey.to_string(), value);
        self.save(key, &map)
    }

    /// Remove `subkey`. Nothing is written when the map or entry is absent.
    #[instrument(skip(self))]
    pub fn delete_value(&self, key: &str, subkey: &str) -> Result<(), VaultError> {
        let mut map: JsonMap<Value> = self.load(key)?;
        if map.remove(subkey).is_none() {
            debug!("entry absent, nothing to delete");
            return Ok(());
        }
        self.save(key, &map)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use fsvault_storage::{EncryptionKeys, FileVault, VaultConfig};
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct TestValue {
        id: String,
    }

    fn test_value(id: &str) -> TestValue {
        TestValue { id: id.into() }
    }

    fn map_store(keys: &[&str]) -> (TempDir, JsonMapStore<FileVault>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = FileVault::new(VaultConfig::new(
            dir.path().to_string_lossy(),
            EncryptionKeys::new(keys.iter().copied()),
        ));
        (dir, JsonMapStore::new(vault))
    }

    #[test]
    fn absent_map_reads_as_empty() {
        let (_dir, maps) = map_store(&[]);
        let map: JsonMap<TestValue> = maps.get_map("/testmap").expect("get_map");
        assert!(map.is_empty());
    }

    #[test]
    fn empty_record_reads_as_empty_map() {
        let (_dir, maps) = map_store(&[]);
        maps.store().put("/testmap", b"").expect("put");
        let map: JsonMap<TestValue> = maps.get_map("/testmap").expect("get_map");
        assert!(map.is_empty());
    }

    #[test]
    fn absent_values_default() {
        let (_dir, maps) = map_store(&[]);
        let value: TestValue = maps.get_value("/testmap", "keyA").expect("absent map");
        assert_eq!(value, TestValue::default());

        maps.put_value("/testmap", "key1", test_value("value1")).expect("put");
        let value: TestValue = maps.get_value("/testmap", "keyA").expect("absent entry");
        assert_eq!(value, TestValue::default());
        let count: u64 = maps.get_value("/counters", "hits").expect("absent number");
        assert_eq!(count, 0);
    }

    #[test]
    fn put_inserts_and_overwrites() {
        let (_dir, maps) = map_store(&[]);
        maps.put_value("/testmap", "key1", test_value("test1")).expect("put");
        maps.put_value("/testmap", "key2", test_value("test2")).expect("put");
        maps.put_value("/testmap", "key1", test_value("test3")).expect("put");

        let map: JsonMap<TestValue> = maps.get_map("/testmap").expect("get_map");
        assert_eq!(map.len(), 2);
        assert_eq!(map["key1"], test_value("test3"));
        assert_eq!(map["key2"], test_value("test2"));
    }

    #[test]
    fn delete_removes_only_the_entry() {
        let (_dir, maps) = map_store(&[]);
        for (subkey, id) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            maps.put_value("/testmap", subkey, test_value(id)).expect("put");
        }

        maps.delete_value("/testmap", "key2").expect("delete");

        let first: TestValue = maps.get_value("/testmap", "key1").expect("get");
        let second: TestValue = maps.get_value("/testmap", "key2").expect("get");
        let third: TestValue = maps.get_value("/testmap", "key3").expect("get");
        assert_eq!(first.id, "value1");
        assert_eq!(second.id, "");
        assert_eq!(third.id, "value3");
    }

    #[test]
    fn delete_on_absent_map_writes_nothing() {
        let (_dir, maps) = map_store(&[]);
        maps.delete_value("/testmap", "key1").expect("no-op");
        assert!(maps.store().get("/testmap").expect_err("still absent").is_not_found());
    }

    #[test]
    fn maps_are_encrypted_like_any_value() {
        let (_dir, maps) = map_store(&["sixteen-byte-key"]);
        maps.put_value("/secrets", "api", "hunter2").expect("put");

        let value: String = maps.get_value("/secrets", "api").expect("get");
        assert_eq!(value, "hunter2");
        let raw = std::fs::read(maps.store().path_for("/secrets")).expect("read");
        assert!(!String::from_utf8_lossy(&raw).contains("hunter2"));
    }

    #[test]
    fn non_object_payload_is_an_error() {
        let (_dir, maps) = map_store(&[]);
        maps.store().put("/testmap", b"[1, 2, 3]").expect("put");

        let err = maps
            .get_value::<TestValue>("/testmap", "key1")
            .expect_err("not a map");
        assert!(matches!(err, VaultError::MapPayload { .. }));
    }

    #[test]
    fn with_lock_reads_return_held_lock() {
        let (_dir, maps) = map_store(&[]);
        maps.put_value("/testmap", "key1", test_value("value1")).expect("put");

        let (lock, value) = maps.get_value_with_lock::<TestValue>("/testmap", "key1");
        assert_eq!(value.expect("read"), test_value("value1"));
        assert_eq!(lock.key(), "/testmap");
        assert_eq!(maps.store().locker().len(), 1);
        lock.release();

        let (lock, map) = maps.get_map_with_lock::<TestValue>("/testmap");
        assert_eq!(map.expect("read").len(), 1);
        drop(lock);
        assert!(maps.store().locker().is_empty());
    }

    #[test]
    fn locked_read_modify_write_loses_no_updates() {
        let (_dir, maps) = map_store(&[]);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        let (lock, hits) = maps.get_value_with_lock::<u64>("/counters", "hits");
                        let hits = hits.expect("read");
                        maps.put_value("/counters", "hits", hits + 1).expect("write");
                        lock.release();
                    }
                });
            }
        });

        let hits: u64 = maps.get_value("/counters", "hits").expect("read");
        assert_eq!(hits, 40);
        assert!(maps.store().locker().is_empty());
    }

    #[test]
    fn spellings_of_one_key_serialize_updates() {
        let (_dir, maps) = map_store(&[]);
        let spellings = ["/counters", "counters", "//counters", "/x/../counters"];

        thread::scope(|scope| {
            for spelling in spellings {
                let maps = &maps;
                scope.spawn(move || {
                    for _ in 0..25 {
                        let (lock, hits) = maps.get_value_with_lock::<u64>(spelling, "hits");
                        let hits = hits.expect("read");
                        maps.put_value(spelling, "hits", hits + 1).expect("write");
                        lock.release();
                    }
                });
            }
        });

        let hits: u64 = maps.get_value("/counters", "hits").expect("read");
        assert_eq!(hits, 100);
        assert!(maps.store().locker().is_empty());
    }

    #[test]
    fn failed_locked_read_still_holds_the_lock() {
        let (_dir, maps) = map_store(&[]);
        maps.store().put("/testmap", b"not json").expect("put");

        let (lock, map) = maps.get_map_with_lock::<TestValue>("/testmap");
        assert!(matches!(map, Err(VaultError::MapPayload { .. })));
        assert_eq!(maps.store().locker().len(), 1);

        maps.store().put("/testmap", b"").expect("reset under lock");
        maps.put_value("/testmap", "key1", test_value("fresh")).expect("rewrite");
        lock.release();

        let (lock, value) = maps.get_value_with_lock::<TestValue>("/testmap", "key1");
        assert_eq!(value.expect("read"), test_value("fresh"));
        drop(lock);
        assert!(maps.store().locker().is_empty());
    }
}
