//! Random sampling of candidates without replacement.
//!
//! The pipeline shuffles once and walks the permutation, so a candidate is
//! offered at most once per run and failed candidates can be skipped without
//! shrinking the sample.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::Candidate;

/// Candidate sampler with an injectable RNG
pub struct Selector {
    rng: StdRng,
}

impl Selector {
    /// Deterministic selector for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Selector seeded from OS entropy
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// `seed` when configured, OS entropy otherwise
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_os_rng(),
        }
    }

    /// Uniform random permutation of the candidates
    pub fn shuffled(&mut self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.shuffle(&mut self.rng);
        candidates
    }

    /// Up to `n` candidates sampled without replacement
    pub fn select(&mut self, candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
        let mut selected = self.shuffled(candidates);
        selected.truncate(n);
        selected
    }
}
