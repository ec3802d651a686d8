use crate::error::{Result, StorageError};
use crate::LinkStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use waypoint_core::{LinkRecord, RecordId, ShortCode, VisitEvent};

/// In-memory implementation of [`LinkStore`].
///
/// Records live in a DashMap keyed by id; a second map indexes the shared
/// code/alias namespace. A single write mutex serializes insert and delete
/// so the check-then-insert and the two maps stay consistent. Reads and
/// per-record mutations go through DashMap's sharded entry locks and do
/// not take the write mutex.
#[derive(Debug)]
pub struct MemoryStore {
    records: DashMap<u64, LinkRecord>,
    keys: DashMap<String, u64>,
    write_lock: Mutex<()>,
    max_records: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            keys: DashMap::new(),
            write_lock: Mutex::new(()),
            max_records: None,
        }
    }

    /// Caps the number of stored records; inserts beyond the cap fail with
    /// [`StorageError::CapacityExceeded`]. Used to exercise the registry's
    /// sweep-then-retry recovery.
    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            max_records: Some(max_records),
            ..Self::new()
        }
    }

    fn remove_locked(&self, id: RecordId) -> bool {
        let Some((_, record)) = self.records.remove(&id.as_u64()) else {
            return false;
        };
        self.keys.remove(record.code.as_str());
        if let Some(alias) = &record.alias {
            self.keys.remove(alias.as_str());
        }
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn insert(&self, record: LinkRecord) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store write lock");

        if let Some(max) = self.max_records {
            if self.records.len() >= max {
                return Err(StorageError::CapacityExceeded(format!(
                    "record cap of {} reached",
                    max
                )));
            }
        }

        if self.keys.contains_key(record.code.as_str()) {
            return Err(StorageError::Conflict(record.code.to_string()));
        }
        if let Some(alias) = &record.alias {
            if self.keys.contains_key(alias.as_str()) {
                return Err(StorageError::Conflict(alias.to_string()));
            }
        }

        let id = record.id.as_u64();
        self.keys.insert(record.code.as_str().to_owned(), id);
        if let Some(alias) = &record.alias {
            self.keys.insert(alias.as_str().to_owned(), id);
        }
        self.records.insert(id, record);
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<LinkRecord>> {
        Ok(self.records.get(&id.as_u64()).map(|r| r.clone()))
    }

    async fn get_by_code(&self, key: &ShortCode) -> Result<Option<LinkRecord>> {
        let Some(id) = self.keys.get(key.as_str()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn get_by_normalized_url(&self, normalized: &str) -> Result<Option<LinkRecord>> {
        // Oldest match wins so repeated dedup lookups are stable.
        let mut found: Option<LinkRecord> = None;
        for entry in self.records.iter() {
            if entry.normalized_url == normalized
                && found
                    .as_ref()
                    .is_none_or(|best| entry.created_at < best.created_at)
            {
                found = Some(entry.clone());
            }
        }
        Ok(found)
    }

    async fn update(&self, record: LinkRecord) -> Result<bool> {
        match self.records.get_mut(&record.id.as_u64()) {
            Some(mut entry) => {
                *entry = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_visit(&self, id: RecordId, event: VisitEvent) -> Result<Option<LinkRecord>> {
        // The entry guard holds the shard lock for the whole read-modify-
        // write, so concurrent visits cannot lose an increment.
        match self.records.get_mut(&id.as_u64()) {
            Some(mut entry) => {
                entry.visit_count += 1;
                entry.visit_history.push(event);
                Ok(Some(entry.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: RecordId) -> Result<bool> {
        let _guard = self.write_lock.lock().expect("store write lock");
        Ok(self.remove_locked(id))
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<u64> {
        let _guard = self.write_lock.lock().expect("store write lock");
        let mut removed = 0;
        for id in ids {
            if self.remove_locked(*id) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<LinkRecord>> {
        Ok(self.records.iter().map(|r| r.clone()).collect())
    }
}
