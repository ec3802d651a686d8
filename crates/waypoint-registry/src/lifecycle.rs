use crate::error::Result;
use jiff::SignedDuration;
use std::sync::Arc;
use tracing::{debug, info};
use typed_builder::TypedBuilder;
use waypoint_core::Clock;
use waypoint_store::LinkStore;

/// Tunables for the lifecycle sweep.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SweepPolicy {
    /// How long an expired record stays recoverable before hard deletion.
    #[builder(default = SignedDuration::from_hours(7 * 24))]
    pub grace_period: SignedDuration,
    /// Maximum visit events retained per record.
    #[builder(default = 1000)]
    pub history_cap: usize,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What a sweep pass did. A second pass over identical state reports zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: u64,
    pub trimmed: u64,
}

/// Opportunistic lifecycle pass over the store: hard-deletes records whose
/// expiry is past the grace period and trims oversized visit histories.
///
/// Safe to run concurrently with reads and unrelated writes; both deletion
/// and trimming go through the store's ordinary `delete`/`update` paths.
pub struct Sweeper<S, C> {
    store: Arc<S>,
    clock: C,
    policy: SweepPolicy,
}

impl<S: LinkStore, C: Clock> Sweeper<S, C> {
    pub fn new(store: Arc<S>, clock: C, policy: SweepPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for record in self.store.list_all().await? {
            // Records with no expiry are never swept by expiration.
            let past_grace = record
                .expires_at
                .is_some_and(|at| now.duration_since(at) > self.policy.grace_period);

            if past_grace {
                if self.store.delete(record.id).await? {
                    debug!(id = %record.id, code = %record.code, "swept expired record");
                    report.removed += 1;
                }
                continue;
            }

            if record.visit_history.len() > self.policy.history_cap {
                let mut trimmed = record;
                let excess = trimmed.visit_history.len() - self.policy.history_cap;
                // Keep the most recent `cap` events in original order;
                // visit_count stays untouched.
                trimmed.visit_history.drain(..excess);
                if self.store.update(trimmed).await? {
                    report.trimmed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                removed = report.removed,
                trimmed = report.trimmed,
                "lifecycle sweep finished"
            );
        }
        Ok(report)
    }
}
