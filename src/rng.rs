//! Seedable randomness for weight initialization, dropout masks and shuffling.
//!
//! There is no global generator. A [`Generator`] is owned by the model and
//! lent to whatever needs randomness; dropout layers own a [`Generator::fork`]
//! of it so that two models never share mutable random state.

use crate::tensors::TensorFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// A deterministic, instance-scoped random source.
#[derive(Debug, Clone)]
pub struct Generator {
    rng: StdRng,
}

impl Generator {
    /// Creates a generator whose stream is fully determined by `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a generator seeded from operating-system entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Derives an independent child generator.
    ///
    /// The child is seeded from this generator's stream, so a seeded parent
    /// yields reproducible children.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::seeded(self.rng.random())
    }

    /// Draws from the standard normal distribution.
    pub fn standard_normal(&mut self) -> TensorFloat {
        StandardNormal.sample(&mut self.rng)
    }

    /// Draws from `N(0, scale^2)`.
    pub fn normal(&mut self, scale: TensorFloat) -> TensorFloat {
        self.standard_normal() * scale
    }

    /// Draws uniformly from `[0, 1)`.
    pub fn uniform(&mut self) -> TensorFloat {
        self.rng.random()
    }

    /// Shuffles `items` in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
