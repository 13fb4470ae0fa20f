// crates/driftwatch-store/src/rocks.rs
//
// RocksDB-backed durable registry.
//
// Key format:
//   - `version:{id:020}`       -> JSON-serialized ModelVersion
//   - `production:{model}`     -> production version id (decimal string)
//   - `baseline:{model}`       -> JSON-serialized Baseline
//   - `meta:next_version_id`   -> next id to assign (u64, little-endian)
//
// Ids are zero-padded so prefix iteration over `version:` yields versions in
// id order. Every mutation goes through one `WriteBatch` while holding the
// write lock, which makes promote's archive-old + set-new + move-pointer a
// single atomic compare-and-swap.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteBatch};
use serde::de::DeserializeOwned;

use driftwatch_core::{Baseline, DriftwatchError, ModelVersion, Registry, VersionId};

use crate::{check_promotable, superseded_reason};

const NEXT_ID_KEY: &[u8] = b"meta:next_version_id";
const VERSION_PREFIX: &str = "version:";

/// RocksDB wrapper implementing the `Registry` trait.
#[derive(Debug)]
pub struct RocksRegistry {
    db: DBWithThreadMode<MultiThreaded>,
    /// Serializes read-modify-write sequences (id assignment, promotion).
    write_lock: Mutex<()>,
}

impl RocksRegistry {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, DriftwatchError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            DriftwatchError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing database read-only, alongside a running daemon.
    pub fn open_read_only(path: &str) -> Result<Self, DriftwatchError> {
        let opts = Options::default();
        let db = DBWithThreadMode::<MultiThreaded>::open_for_read_only(&opts, path, false)
            .map_err(|e| {
                DriftwatchError::Storage(format!(
                    "Failed to open RocksDB read-only at {}: {}",
                    path, e
                ))
            })?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Build the primary key for a version: `version:{id:020}`.
    fn version_key(id: VersionId) -> Vec<u8> {
        format!("{}{:020}", VERSION_PREFIX, id).into_bytes()
    }

    /// Build the production pointer key: `production:{model}`.
    fn production_key(model: &str) -> Vec<u8> {
        format!("production:{}", model).into_bytes()
    }

    /// Build the baseline key: `baseline:{model}`.
    fn baseline_key(model: &str) -> Vec<u8> {
        format!("baseline:{}", model).into_bytes()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().expect("registry write lock poisoned")
    }

    /// Get raw bytes from RocksDB, mapping errors to DriftwatchError::Storage.
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DriftwatchError> {
        self.db
            .get(key)
            .map_err(|e| DriftwatchError::Storage(format!("RocksDB get failed: {}", e)))
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, DriftwatchError> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, batch: WriteBatch) -> Result<(), DriftwatchError> {
        self.db
            .write(batch)
            .map_err(|e| DriftwatchError::Storage(format!("RocksDB write failed: {}", e)))
    }

    fn get_version(&self, id: VersionId) -> Result<Option<ModelVersion>, DriftwatchError> {
        self.get_json(&Self::version_key(id))
    }

    fn production_id(&self, model: &str) -> Result<Option<VersionId>, DriftwatchError> {
        match self.get_raw(&Self::production_key(model))? {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    DriftwatchError::Storage(format!("Corrupt production pointer for {}: {}", model, e))
                })?;
                let id = text.parse::<VersionId>().map_err(|e| {
                    DriftwatchError::Storage(format!("Corrupt production pointer for {}: {}", model, e))
                })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    fn next_id(&self) -> Result<VersionId, DriftwatchError> {
        match self.get_raw(NEXT_ID_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    DriftwatchError::Storage("Corrupt version id counter".to_string())
                })?;
                Ok(u64::from_le_bytes(arr))
            }
            None => Ok(1),
        }
    }
}

#[async_trait]
impl Registry for RocksRegistry {
    async fn register(&self, mut version: ModelVersion) -> Result<VersionId, DriftwatchError> {
        let _guard = self.lock();
        let id = self.next_id()?;
        version.version_id = id;

        let mut batch = WriteBatch::default();
        batch.put(Self::version_key(id), serde_json::to_vec(&version)?);
        batch.put(NEXT_ID_KEY, (id + 1).to_le_bytes());
        self.write(batch)?;
        Ok(id)
    }

    async fn promote(
        &self,
        model: &str,
        version_id: VersionId,
        expected_current: Option<VersionId>,
    ) -> Result<(), DriftwatchError> {
        let _guard = self.lock();

        let actual = self.production_id(model)?;
        if actual != expected_current {
            return Err(DriftwatchError::Conflict {
                model: model.to_string(),
                expected: expected_current,
                actual,
            });
        }
        if actual == Some(version_id) {
            return Ok(());
        }

        let mut candidate = self
            .get_version(version_id)?
            .ok_or_else(|| DriftwatchError::NotFound(format!("version {}", version_id)))?;
        check_promotable(model, version_id, &candidate)?;

        let now = Utc::now();
        let mut batch = WriteBatch::default();
        if let Some(previous) = actual {
            if let Some(mut old) = self.get_version(previous)? {
                old.mark_archived(&superseded_reason(version_id), now);
                batch.put(Self::version_key(previous), serde_json::to_vec(&old)?);
            }
        }
        candidate.mark_production(now);
        batch.put(Self::version_key(version_id), serde_json::to_vec(&candidate)?);
        batch.put(Self::production_key(model), version_id.to_string());
        self.write(batch)
    }

    async fn get_production(&self, model: &str) -> Result<Option<ModelVersion>, DriftwatchError> {
        match self.production_id(model)? {
            Some(id) => self.get_version(id),
            None => Ok(None),
        }
    }

    async fn get(&self, version_id: VersionId) -> Result<Option<ModelVersion>, DriftwatchError> {
        self.get_version(version_id)
    }

    async fn archive(&self, version_id: VersionId, reason: &str) -> Result<(), DriftwatchError> {
        let _guard = self.lock();
        let mut version = self
            .get_version(version_id)?
            .ok_or_else(|| DriftwatchError::NotFound(format!("version {}", version_id)))?;

        if self.production_id(&version.model)? == Some(version_id) {
            return Err(DriftwatchError::InvalidState(format!(
                "version {} is production for {}; promote a successor instead",
                version_id, version.model
            )));
        }

        if version.mark_archived(reason, Utc::now()) {
            let mut batch = WriteBatch::default();
            batch.put(Self::version_key(version_id), serde_json::to_vec(&version)?);
            self.write(batch)?;
        }
        Ok(())
    }

    async fn list(&self, model: &str) -> Result<Vec<ModelVersion>, DriftwatchError> {
        let prefix = VERSION_PREFIX.as_bytes();
        let mut versions = Vec::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item
                .map_err(|e| DriftwatchError::Storage(format!("RocksDB iteration error: {}", e)))?;

            // Stop when the prefix no longer matches.
            if !key.starts_with(prefix) {
                break;
            }

            let version: ModelVersion = serde_json::from_slice(&value)?;
            if version.model == model {
                versions.push(version);
            }
        }

        Ok(versions)
    }

    async fn baseline(&self, model: &str) -> Result<Option<Baseline>, DriftwatchError> {
        self.get_json(&Self::baseline_key(model))
    }

    async fn set_baseline(&self, baseline: Baseline) -> Result<(), DriftwatchError> {
        let mut batch = WriteBatch::default();
        batch.put(Self::baseline_key(&baseline.model), serde_json::to_vec(&baseline)?);
        self.write(batch)
    }
}
