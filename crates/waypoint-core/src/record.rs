use crate::code::ShortCode;
use crate::expiry::is_expired;
use crate::record_id::RecordId;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Opaque per-visit metadata captured by the caller layer.
///
/// The registry stores this payload as-is; capture and truncation are the
/// collaborator's concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitMeta {
    pub referrer: Option<String>,
    pub device: Option<String>,
    pub timezone: Option<String>,
    pub user_agent: Option<String>,
}

/// A single recorded visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<VisitMeta>,
}

/// A stored link record, the unit the registry manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Unique identifier, assigned at creation, never reused.
    pub id: RecordId,
    /// The untouched input URL.
    pub original_url: String,
    /// Canonical form of `original_url`, the deduplication key.
    pub normalized_url: String,
    /// Primary lookup key, immutable once assigned.
    pub code: ShortCode,
    /// Optional caller-supplied secondary key, same namespace as `code`.
    pub alias: Option<ShortCode>,
    pub created_at: Timestamp,
    /// `None` means the record never expires.
    pub expires_at: Option<Timestamp>,
    /// Monotone counter; history trimming does not touch it.
    pub visit_count: u64,
    /// Append-only in normal operation, front-truncated only by the sweeper.
    pub visit_history: Vec<VisitEvent>,
    /// Optional access gate a visit must match before it is counted.
    pub secret: Option<String>,
}

impl LinkRecord {
    /// Whether the record is expired at `now`. Grace period does not factor
    /// in here; see the sweeper for deletion eligibility.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        is_expired(self.expires_at, now)
    }

    /// Whether `key` matches this record's code or alias (case-sensitive).
    pub fn matches_key(&self, key: &ShortCode) -> bool {
        &self.code == key || self.alias.as_ref() == Some(key)
    }
}
