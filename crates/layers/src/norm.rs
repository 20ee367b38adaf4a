//! Layer normalisation along a single named axis.
//!
//! Mean and variance are computed in [`PrecisionPolicy::reduction`] along the
//! normalised axis; every other axis is treated independently. The affine
//! scale and shift live over that same axis.

use candle_core::{DType, Device, Tensor};

use crate::{axis::Axis, checks, dtypes::PrecisionPolicy, named::NamedTensor, LayerError, Result};

/// Standard LayerNorm with learnable scale (init 1) and shift (init 0).
#[derive(Debug, Clone)]
pub struct LayerNorm {
    axis: Axis,
    epsilon: f64,
    weight: NamedTensor,
    bias: NamedTensor,
}

impl LayerNorm {
    /// Constructs a LayerNorm from explicit affine parameters over `axis`.
    pub fn new(axis: Axis, epsilon: f64, weight: NamedTensor, bias: NamedTensor) -> Result<Self> {
        if epsilon.is_nan() || epsilon <= 0.0 {
            return Err(LayerError::InvalidConfig(format!(
                "layer norm epsilon must be positive, got {epsilon}"
            )));
        }
        for (name, param) in [("norm.weight", &weight), ("norm.bias", &bias)] {
            if param.axes() != std::slice::from_ref(&axis) {
                return Err(LayerError::InvalidConfig(format!(
                    "{name} must be shaped [{axis}], got {:?}",
                    param.axes()
                )));
            }
            checks::expect_dtype_in(name, param.tensor(), checks::FLOAT_DTYPES)?;
        }
        Ok(Self {
            axis,
            epsilon,
            weight,
            bias,
        })
    }

    /// Identity-initialised LayerNorm (scale 1, shift 0).
    pub fn init(axis: &Axis, epsilon: f64, device: &Device, dtype: DType) -> Result<Self> {
        let weight = NamedTensor::ones(std::slice::from_ref(axis), dtype, device)?;
        let bias = NamedTensor::zeros(std::slice::from_ref(axis), dtype, device)?;
        Self::new(axis.clone(), epsilon, weight, bias)
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn weight(&self) -> &NamedTensor {
        &self.weight
    }

    pub fn bias(&self) -> &NamedTensor {
        &self.bias
    }

    pub fn parameter_count(&self) -> usize {
        2 * self.axis.size()
    }

    /// Normalises `hidden` along the configured axis.
    pub fn forward(&self, hidden: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor> {
        let dim = hidden.axis_index(&self.axis, "norm.input")?;
        let compute = policy.cast_for_reduction(hidden)?;
        let epsilon = self.epsilon;
        let normalized = compute.map(|x: &Tensor| {
            let mean = x.mean_keepdim(dim)?;
            let centered = x.broadcast_sub(&mean)?;
            let variance = centered.sqr()?.mean_keepdim(dim)?;
            let denom = variance.affine(1.0, epsilon)?.sqrt()?;
            centered.broadcast_div(&denom)
        })?;

        let scaled = normalized
            .to_dtype(policy.compute())?
            .mul(&policy.cast_for_matmul(&self.weight)?)?;
        let shifted = scaled.add(&policy.cast_for_matmul(&self.bias)?)?;
        policy.cast_to_storage(&shifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::PrngKey;
    use candle_core::Device;

    fn axes() -> (Axis, Axis) {
        (Axis::new("position", 3), Axis::new("embedding", 4))
    }

    #[test]
    fn layer_norm_matches_candle_reference() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed) = axes();
        let weight = NamedTensor::from_vec(vec![1.0f32, 0.5, -0.25, 1.5], &[embed.clone()], &device)?;
        let bias = NamedTensor::from_vec(vec![0.1f32, -0.2, 0.05, 0.0], &[embed.clone()], &device)?;
        let norm = LayerNorm::new(embed.clone(), 1e-5, weight.clone(), bias.clone())?;
        let x = PrngKey::new(9).normal_tensor(&[pos.clone(), embed.clone()], 2.0, &device)?;
        let out = norm.forward(&x, &PrecisionPolicy::default())?;
        assert_eq!(out.axes(), x.axes());

        let reference = candle_nn::ops::layer_norm(
            x.tensor(),
            weight.tensor(),
            bias.tensor(),
            1e-5,
        )?;
        let reference = NamedTensor::new(reference, vec![pos, embed])?;
        assert!(out.max_abs_diff(&reference)? < 1e-4);
        Ok(())
    }

    #[test]
    fn normalises_along_named_axis_regardless_of_layout() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed) = axes();
        let norm = LayerNorm::init(&embed, 1e-5, &device, DType::F32)?;
        let x = PrngKey::new(1).normal_tensor(&[pos.clone(), embed.clone()], 3.0, &device)?;
        let transposed = x.rearrange(&[embed.clone(), pos.clone()])?;
        let policy = PrecisionPolicy::default();
        let a = norm.forward(&x, &policy)?;
        let b = norm.forward(&transposed, &policy)?;
        assert_eq!(b.axes(), &[embed.clone(), pos.clone()]);
        assert!(a.max_abs_diff(&b)? < 1e-6);

        for row in a.to_vec_f32(&[pos, embed])?.chunks(4) {
            let mean = row.iter().sum::<f32>() / 4.0;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-2);
        }
        Ok(())
    }

    #[test]
    fn rejects_non_positive_epsilon() {
        let device = Device::Cpu;
        let (_, embed) = axes();
        assert!(LayerNorm::init(&embed, 0.0, &device, DType::F32).is_err());
    }
}
