// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A narrow byte-oriented persistence substrate shared by the [`crate::deal::store`] and
//! [`crate::sector::store`] modules. Neither of those modules knows anything about the
//! backing engine; they only ever see [`KeyValueStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Minimal contract a persistence backend must satisfy. Keys are namespaced strings
/// (e.g. `"/sectors/metadata/<label>"`); values are opaque bytes.
pub trait KeyValueStore: Send + Sync {
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.read_bin(key)?.is_some())
    }
    /// Full scan of every entry whose key starts with `prefix`, in unspecified order.
    fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>>;
}

/// Typed convenience helpers layered over any [`KeyValueStore`], encoding with DAG-CBOR.
pub trait KeyValueStoreExt: KeyValueStore {
    fn write_obj<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_ipld_dagcbor::to_vec(value)?;
        self.write_bin(key, &bytes)
    }

    fn read_obj<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.read_bin(key)? {
            Some(bytes) => Ok(Some(serde_ipld_dagcbor::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_obj<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        self.read_obj(key)?
            .ok_or_else(|| anyhow::anyhow!("no value at key {key}"))
    }
}

impl<DB: KeyValueStore + ?Sized> KeyValueStoreExt for DB {}

/// A `HashMap`-backed store, used by the whole test suite and suitable for a
/// single-process deployment that does not need durability across restarts.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.inner.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .inner
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(feature = "paritydb-store")]
pub mod parity {
    //! Production-grade on-disk backend. Gated behind `paritydb-store` so the default
    //! build (and every test) stays dependency-light and fully in-memory.
    use std::path::Path;

    use super::KeyValueStore;

    const COL: u8 = 0;

    pub struct ParityDbStore {
        db: parity_db::Db,
    }

    impl ParityDbStore {
        pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
            let mut options = parity_db::Options::with_columns(path.as_ref(), 1);
            options.columns[COL as usize].btree_index = true;
            let db = parity_db::Db::open_or_create(&options)?;
            Ok(Self { db })
        }
    }

    impl KeyValueStore for ParityDbStore {
        fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            self.db
                .commit(vec![(COL, key.as_bytes().to_vec(), Some(value.to_vec()))])?;
            Ok(())
        }

        fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(self.db.get(COL, key.as_bytes())?)
        }

        fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
            let mut out = Vec::new();
            let mut iter = self.db.iter(COL)?;
            iter.seek(prefix.as_bytes())?;
            while let Some((k, v)) = iter.next()? {
                let Ok(key) = String::from_utf8(k) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    break;
                }
                out.push((key, v));
            }
            Ok(out)
        }
    }
}
