use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Search terms the generator draws from, in selection order.
pub const SEARCH_TERMS: [&str; 7] = [
    "alpha",
    "beta",
    "electronics",
    "books",
    "product",
    "gamma",
    "delta",
];

/// Source of term indices for the traffic generator.
///
/// Implementations return an index in `0..len`; the generator folds anything
/// larger back into range.
pub trait TermSource {
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform term selection backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RngTermSource<R = StdRng> {
    rng: R,
}

impl RngTermSource<StdRng> {
    /// Deterministic source; equal seeds yield equal term sequences.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> RngTermSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> TermSource for RngTermSource<R> {
    fn pick(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn term_set_is_fixed_and_distinct() {
        assert_eq!(SEARCH_TERMS.len(), 7);
        assert_eq!(SEARCH_TERMS[0], "alpha");
        assert_eq!(SEARCH_TERMS[2], "electronics");
        assert_eq!(SEARCH_TERMS[6], "delta");

        let unique: HashSet<_> = SEARCH_TERMS.iter().collect();
        assert_eq!(unique.len(), SEARCH_TERMS.len());
        assert!(SEARCH_TERMS.iter().all(|term| {
            !term.is_empty() && term.chars().all(|ch| ch.is_ascii_lowercase())
        }));
    }

    #[test]
    fn seeded_sources_repeat_their_sequence() {
        let mut first = RngTermSource::seeded(42);
        let mut second = RngTermSource::seeded(42);
        let a: Vec<usize> = (0..64).map(|_| first.pick(SEARCH_TERMS.len())).collect();
        let b: Vec<usize> = (0..64).map(|_| second.pick(SEARCH_TERMS.len())).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|index| *index < SEARCH_TERMS.len()));
    }

    #[test]
    fn empty_range_picks_zero() {
        let mut source = RngTermSource::seeded(1);
        assert_eq!(source.pick(0), 0);
    }
}
