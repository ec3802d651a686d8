use crate::error::{RegistryError, Result};
use std::sync::Arc;
use tracing::{trace, warn};
use waypoint_codegen::CodeGenerator;
use waypoint_core::ShortCode;
use waypoint_store::LinkStore;

/// One rung of the allocation ladder: how many candidates to try at a
/// given code length before escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTier {
    pub length: usize,
    pub attempts: u32,
}

/// The retry ladder is part of the contract, not an implementation detail:
/// 5 tries at the default length, then 3 at 9 symbols, then 2 at 11.
/// Escalation trades code length for success probability in the
/// astronomically rare case of sustained collisions.
pub const DEFAULT_TIERS: [AllocationTier; 3] = [
    AllocationTier {
        length: 7,
        attempts: 5,
    },
    AllocationTier {
        length: 9,
        attempts: 3,
    },
    AllocationTier {
        length: 11,
        attempts: 2,
    },
];

/// Combines a generator and a store lookup into a guaranteed-fresh code.
///
/// `allocate` has no side effects: the returned code is reserved in intent
/// only, and the store's insert uniqueness check remains the authoritative
/// guard against a race between allocation and insertion.
pub struct Allocator<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    tiers: Vec<AllocationTier>,
}

impl<S: LinkStore, G: CodeGenerator> Allocator<S, G> {
    pub fn new(store: Arc<S>, generator: Arc<G>) -> Self {
        Self::with_tiers(store, generator, DEFAULT_TIERS.to_vec())
    }

    pub fn with_tiers(store: Arc<S>, generator: Arc<G>, tiers: Vec<AllocationTier>) -> Self {
        Self {
            store,
            generator,
            tiers,
        }
    }

    /// Allocates a code for a new record.
    ///
    /// With a requested alias: validates the format and checks the shared
    /// code/alias namespace; a taken alias fails immediately, the caller
    /// may retry with a different one or fall back to generated codes.
    pub async fn allocate(&self, requested_alias: Option<&str>) -> Result<ShortCode> {
        if let Some(alias) = requested_alias {
            let alias = ShortCode::new(alias)?;
            if self.store.get_by_code(&alias).await?.is_some() {
                return Err(RegistryError::AliasTaken(alias.to_string()));
            }
            return Ok(alias);
        }

        for tier in &self.tiers {
            for attempt in 0..tier.attempts {
                let candidate = self.generator.generate(tier.length);
                if self.store.get_by_code(&candidate).await?.is_none() {
                    trace!(
                        code = %candidate,
                        length = tier.length,
                        attempt,
                        "allocated short code"
                    );
                    return Ok(candidate);
                }
            }
            warn!(
                length = tier.length,
                attempts = tier.attempts,
                "allocation tier exhausted, escalating code length"
            );
        }

        // Statistically unreachable with a healthy generator; if it ever
        // fires, something upstream is feeding us a degenerate code space.
        warn!("all allocation tiers exhausted");
        Err(RegistryError::AllocationExhausted)
    }
}
