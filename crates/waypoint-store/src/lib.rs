//! Storage backends for the Waypoint registry.
//!
//! The [`LinkStore`] trait is the single write path for every component:
//! the registry service, visit accounting and the lifecycle sweeper all go
//! through it, which is what makes last-writer-wins resolution sound.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use waypoint_core::{LinkRecord, RecordId, ShortCode, VisitEvent};

/// Durable mapping of link records, keyed by id with a unique secondary
/// index over the shared code/alias namespace and a non-unique index over
/// the normalized URL.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Inserts a new record. Fails with [`StorageError::Conflict`] if the
    /// record's code or alias is already taken; the check and the insert
    /// are atomic.
    async fn insert(&self, record: LinkRecord) -> Result<()>;

    /// Retrieves a record by id.
    async fn get(&self, id: RecordId) -> Result<Option<LinkRecord>>;

    /// Retrieves a record by code or alias (one shared namespace).
    async fn get_by_code(&self, key: &ShortCode) -> Result<Option<LinkRecord>>;

    /// Returns the first record whose normalized URL matches, if any.
    async fn get_by_normalized_url(&self, normalized: &str) -> Result<Option<LinkRecord>>;

    /// Full replace by id. Returns `false` if no record with that id
    /// exists. Code and alias are immutable, so the key index is untouched.
    async fn update(&self, record: LinkRecord) -> Result<bool>;

    /// Atomically increments the visit counter and appends the event to
    /// the record's history. Returns the updated record, or `None` if the
    /// id is unknown.
    async fn append_visit(&self, id: RecordId, event: VisitEvent) -> Result<Option<LinkRecord>>;

    /// Deletes a record. Idempotent: returns `false` if it did not exist.
    async fn delete(&self, id: RecordId) -> Result<bool>;

    /// Deletes a batch of records, returning how many existed.
    async fn delete_many(&self, ids: &[RecordId]) -> Result<u64>;

    /// Returns every live record.
    async fn list_all(&self) -> Result<Vec<LinkRecord>>;
}
