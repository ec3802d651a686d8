//! Core types and leaf logic for the Waypoint URL-shortening registry.
//!
//! This crate provides the domain model shared by the storage backends and
//! the registry service: link records, short codes, record identifiers,
//! URL normalization and the expiration policy.

pub mod clock;
pub mod code;
pub mod error;
pub mod expiry;
pub mod normalize;
pub mod record;
pub mod record_id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::ShortCode;
pub use error::CoreError;
pub use expiry::{is_expired, ExpirationPolicy, ExpiryPreset};
pub use normalize::{normalize, validate_url, DefaultSuspicionFilter, SuspicionFilter};
pub use record::{LinkRecord, VisitEvent, VisitMeta};
pub use record_id::{RecordId, RecordIdError, RecordIdGenerator, RecordIdSettings};
