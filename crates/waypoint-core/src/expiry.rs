use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Expiration policy for a shortened URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    /// The shortened URL never expires.
    Never,
    /// The shortened URL expires after a certain duration from now.
    AfterDuration(SignedDuration),
    /// The shortened URL expires at a specific timestamp.
    AtTimestamp(Timestamp),
}

impl ExpirationPolicy {
    /// Resolves the policy to a concrete expiry instant, relative to `now`.
    pub fn expires_at(&self, now: Timestamp) -> Option<Timestamp> {
        match self {
            ExpirationPolicy::Never => None,
            ExpirationPolicy::AfterDuration(duration) => Some(now + *duration),
            ExpirationPolicy::AtTimestamp(at) => Some(*at),
        }
    }
}

/// The fixed expiry choices offered at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryPreset {
    Never,
    OneHour,
    OneDay,
    SevenDays,
    ThirtyDays,
}

impl From<ExpiryPreset> for ExpirationPolicy {
    fn from(preset: ExpiryPreset) -> Self {
        match preset {
            ExpiryPreset::Never => ExpirationPolicy::Never,
            ExpiryPreset::OneHour => ExpirationPolicy::AfterDuration(SignedDuration::from_hours(1)),
            ExpiryPreset::OneDay => ExpirationPolicy::AfterDuration(SignedDuration::from_hours(24)),
            ExpiryPreset::SevenDays => {
                ExpirationPolicy::AfterDuration(SignedDuration::from_hours(7 * 24))
            }
            ExpiryPreset::ThirtyDays => {
                ExpirationPolicy::AfterDuration(SignedDuration::from_hours(30 * 24))
            }
        }
    }
}

/// Whether a record with the given expiry instant counts as expired at `now`.
///
/// This predicate is deliberately grace-period-blind: a link stops being
/// honorable the moment `expires_at` passes. The grace period only delays
/// hard deletion by the sweeper.
pub fn is_expired(expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    expires_at.is_some_and(|at| at < now)
}
