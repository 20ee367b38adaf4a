//! Splittable keys for deterministic parameter initialisation.
//!
//! A [`PrngKey`] never produces randomness itself more than once: callers
//! split it into child keys, one per sub-component, and hand each child down
//! the parameter tree. Splitting seeds a [`StdRng`] from the key and reads the
//! child seeds in order with `next_u64`, so a given key always yields the same
//! children in the same order. Sampling seeds a fresh [`StdRng`] from the key
//! and draws values row-major.

use candle_core::{Device, Tensor};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    axis::{self, Axis},
    named::NamedTensor,
    LayerError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrngKey(u64);

impl PrngKey {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn seed(&self) -> u64 {
        self.0
    }

    /// Derives `n` independent child keys.
    pub fn split(&self, n: usize) -> Vec<PrngKey> {
        let mut rng = self.rng();
        (0..n).map(|_| PrngKey(rng.next_u64())).collect()
    }

    /// Fixed-size form of [`PrngKey::split`].
    pub fn split_array<const N: usize>(&self) -> [PrngKey; N] {
        let mut rng = self.rng();
        std::array::from_fn(|_| PrngKey(rng.next_u64()))
    }

    /// Draws `count` samples from `N(0, std^2)`.
    pub fn normal(&self, std: f64, count: usize) -> Result<Vec<f32>> {
        if !(std.is_finite() && std >= 0.0) {
            return Err(LayerError::InvalidConfig(format!(
                "normal std must be finite and non-negative, got {std}"
            )));
        }
        let dist = Normal::new(0f32, std as f32).map_err(|err| {
            LayerError::InvalidConfig(format!("invalid normal std {std}: {err}"))
        })?;
        let mut rng = self.rng();
        Ok((0..count).map(|_| dist.sample(&mut rng)).collect())
    }

    /// Samples an `f32` tensor over `axes` from `N(0, std^2)`.
    pub fn normal_tensor(&self, axes: &[Axis], std: f64, device: &Device) -> Result<NamedTensor> {
        let data = self.normal(std, axis::volume(axes))?;
        let tensor = Tensor::from_vec(data, axis::sizes(axes), device)?;
        NamedTensor::new(tensor, axes.to_vec())
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}
