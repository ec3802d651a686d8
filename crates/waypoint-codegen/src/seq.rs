use crate::{CodeGenerator, ALPHABET};
use std::sync::atomic::{AtomicU64, Ordering};
use waypoint_core::ShortCode;

/// Deterministic sequential generator.
///
/// Encodes a monotonically increasing counter in base 62, left-padded to
/// the requested length. Useful in tests where predictable codes matter,
/// and for forcing collisions against a pre-seeded store.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
}

impl SeqGenerator {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Starts the counter at a specific value.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
        }
    }

    fn encode(mut value: u64, length: usize) -> String {
        let mut symbols = Vec::new();
        loop {
            symbols.push(ALPHABET[(value % 62) as usize]);
            value /= 62;
            if value == 0 {
                break;
            }
        }
        while symbols.len() < length {
            symbols.push(ALPHABET[0]);
        }
        symbols.reverse();
        // Counter overflowing the requested length keeps the most
        // significant digits out; uniqueness still holds per length.
        let start = symbols.len().saturating_sub(length);
        String::from_utf8(symbols[start..].to_vec()).expect("alphabet is ascii")
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for SeqGenerator {
    fn generate(&self, length: usize) -> ShortCode {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortCode::new_unchecked(Self::encode(count, length))
    }
}
