use crate::{CodeGenerator, ALPHABET};
use rand::Rng;
use waypoint_core::ShortCode;

/// Uniform random code generator backed by the thread-local CSPRNG.
///
/// Each symbol is drawn independently and uniformly from the 62-symbol
/// alphabet. No state is shared between calls, so observing one code
/// reveals nothing about the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl RandomGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for RandomGenerator {
    fn generate(&self, length: usize) -> ShortCode {
        let mut rng = rand::rng();
        let code: String = (0..length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
