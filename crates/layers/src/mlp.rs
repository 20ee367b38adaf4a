//! Position-wise feed-forward blocks built on top of projections and activations.
//!
//! The MLP reads the `embedding` axis, expands it to `intermediate`, applies an
//! elementwise activation, and contracts back to `embedding`. No other axis is
//! touched, so positions never interact.

use candle_core::{DType, Device};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    activations::{builtin, ActivationKind},
    axis::{names, Axis},
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearInit},
    named::NamedTensor,
    prng::PrngKey,
    sequential::Sequential,
    LayerError, Result,
};

/// Configuration shared by transformer feed-forward networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub embedding_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
    /// Activation applied between projections.
    #[serde(default)]
    pub activation: ActivationKind,
    #[serde(default)]
    pub init: LinearInit,
}

impl FeedForwardConfig {
    /// Creates a GELU MLP configuration.
    pub fn new(embedding_size: usize, intermediate_size: usize) -> Self {
        Self {
            embedding_size,
            intermediate_size,
            activation: ActivationKind::Gelu,
            init: LinearInit::default(),
        }
    }

    pub fn embed_axis(&self) -> Axis {
        Axis::new(names::EMBED, self.embedding_size)
    }

    pub fn intermediate_axis(&self) -> Axis {
        Axis::new(names::INTERMEDIATE, self.intermediate_size)
    }
}

/// Two-layer feed-forward block: `linear_out(act(linear_in(x)))`.
#[derive(Debug, Clone)]
pub struct Mlp {
    linear_in: Linear,
    linear_out: Linear,
    activation: ActivationKind,
}

impl Mlp {
    /// Initialises both projections from `key` split as `[linear_in, linear_out]`.
    pub fn init(
        config: &FeedForwardConfig,
        key: PrngKey,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        if config.embedding_size == 0 || config.intermediate_size == 0 {
            return Err(LayerError::InvalidConfig(
                "mlp sizes must be greater than zero".into(),
            ));
        }
        let embed = config.embed_axis();
        let intermediate = config.intermediate_axis();
        let [in_key, out_key] = key.split_array();
        let linear_in = Linear::init(
            &[embed.clone()],
            &[intermediate.clone()],
            true,
            &config.init,
            in_key,
            device,
            dtype,
        )?;
        let linear_out = Linear::init(
            &[intermediate],
            &[embed],
            true,
            &config.init,
            out_key,
            device,
            dtype,
        )?;
        debug!(
            "mlp initialised: {} -> {} ({:?})",
            config.embedding_size, config.intermediate_size, config.activation
        );
        Ok(Self {
            linear_in,
            linear_out,
            activation: config.activation,
        })
    }

    pub fn linear_in(&self) -> &Linear {
        &self.linear_in
    }

    pub fn linear_out(&self) -> &Linear {
        &self.linear_out
    }

    pub fn parameter_count(&self) -> usize {
        self.linear_in.parameter_count() + self.linear_out.parameter_count()
    }

    pub fn forward(&self, hidden: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor> {
        let activation = builtin(self.activation);
        let output = Sequential::new()
            .then(|x: NamedTensor| self.linear_in.forward(&x, policy))
            .then(|x: NamedTensor| activation.forward(&x, policy))
            .then(|x: NamedTensor| self.linear_out.forward(&x, policy))
            .run(hidden.clone());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::gelu;

    #[test]
    fn output_keeps_input_axes() -> Result<()> {
        let device = Device::Cpu;
        let config = FeedForwardConfig::new(4, 16);
        let mlp = Mlp::init(&config, PrngKey::new(2), &device, DType::F32)?;
        let batch = Axis::new("batch", 2);
        let pos = Axis::new(names::POSITION, 3);
        let x = PrngKey::new(8).normal_tensor(&[batch.clone(), pos.clone(), config.embed_axis()], 1.0, &device)?;
        let y = mlp.forward(&x, &PrecisionPolicy::default())?;
        assert_eq!(y.axes(), &[batch, pos, config.embed_axis()]);
        assert_eq!(mlp.parameter_count(), 4 * 16 + 16 + 16 * 4 + 4);
        Ok(())
    }

    #[test]
    fn positions_are_processed_independently() -> Result<()> {
        let device = Device::Cpu;
        let config = FeedForwardConfig::new(4, 8);
        let mlp = Mlp::init(&config, PrngKey::new(4), &device, DType::F32)?;
        let pos = Axis::new(names::POSITION, 3);
        let x = PrngKey::new(6).normal_tensor(&[pos.clone(), config.embed_axis()], 1.0, &device)?;
        let policy = PrecisionPolicy::default();
        let y = mlp.forward(&x, &policy)?;
        for p in 0..pos.size() {
            let single = mlp.forward(&x.index(&pos, p)?, &policy)?;
            assert!(y.index(&pos, p)?.max_abs_diff(&single)? < 1e-6);
        }

        let manual = mlp
            .linear_out()
            .forward(&gelu(&mlp.linear_in().forward(&x, &policy)?, &policy)?, &policy)?;
        assert!(y.max_abs_diff(&manual)? < 1e-6);
        Ok(())
    }
}
