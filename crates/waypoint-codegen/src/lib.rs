//! Short-code generation for the Waypoint registry.
//!
//! Generators are pure: they produce candidate codes of a requested length
//! and never talk to storage. Collision avoidance is the allocator's job.

pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use waypoint_core::ShortCode;

/// The 62-symbol code alphabet: lowercase, uppercase, digits.
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default generated code length: 62^7 is about 3.5e12 possible codes.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Trait for generating candidate short codes.
///
/// No two calls are required to differ. Implementations must not leak
/// predictable state between calls that would narrow the output space.
pub trait CodeGenerator: Send + Sync + 'static {
    /// Produces a code of `length` symbols drawn from [`ALPHABET`].
    fn generate(&self, length: usize) -> ShortCode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_has_62_unique_symbols() {
        let mut symbols: Vec<u8> = ALPHABET.to_vec();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), 62);
    }

    #[test]
    fn generators_are_object_safe() {
        fn assert_dyn(_: &dyn CodeGenerator) {}
        assert_dyn(&RandomGenerator::new());
        assert_dyn(&SeqGenerator::new());
    }
}
