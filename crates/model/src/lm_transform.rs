//! Final normalisation and projection applied before the tied readout.

use candle_core::{DType, Device};
use layers::{
    activations::gelu, sequential, Axis, LayerNorm, Linear, LinearInit, NamedTensor,
    PrecisionPolicy, PrngKey, Sequential,
};

use crate::{config::GptConfig, error::Result};

/// A square linear map over one axis.
///
/// The axis is renamed to an `_in` alias before the projection, and the
/// projection's `_out` alias is renamed back afterwards, so the weight can
/// carry the same dimension twice.
#[derive(Debug, Clone)]
pub struct DuplicateAxisLinear {
    linear: Linear,
    axis: Axis,
    input: Axis,
    output: Axis,
}

impl DuplicateAxisLinear {
    pub fn init(
        axis: &Axis,
        init: &LinearInit,
        key: PrngKey,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let input = axis.alias(format!("{}_in", axis.name()));
        let output = axis.alias(format!("{}_out", axis.name()));
        let linear = Linear::init(
            std::slice::from_ref(&input),
            std::slice::from_ref(&output),
            true,
            init,
            key,
            device,
            dtype,
        )?;
        Ok(Self {
            linear,
            axis: axis.clone(),
            input,
            output,
        })
    }

    pub fn linear(&self) -> &Linear {
        &self.linear
    }

    pub fn forward(&self, x: &NamedTensor, policy: &PrecisionPolicy) -> layers::Result<NamedTensor> {
        let stages: [&dyn Fn(NamedTensor) -> layers::Result<NamedTensor>; 3] = [
            &|x: NamedTensor| x.rename(&self.axis, &self.input),
            &|x: NamedTensor| self.linear.forward(&x, policy),
            &|x: NamedTensor| x.rename(&self.output, &self.axis),
        ];
        sequential(&stages, x.clone())
    }
}

/// `gelu(linear(layer_norm(x)))` over the embedding axis.
#[derive(Debug, Clone)]
pub struct LMTransform {
    norm: LayerNorm,
    linear: DuplicateAxisLinear,
    policy: PrecisionPolicy,
}

impl LMTransform {
    /// The whole key goes to the linear; the norm starts at identity.
    pub fn init(config: &GptConfig, key: PrngKey, device: &Device) -> Result<Self> {
        let dtype = config.dtype();
        let embed = config.embed_axis();
        let linear = DuplicateAxisLinear::init(&embed, &config.linear_init(), key, device, dtype)?;
        let norm = LayerNorm::init(&embed, config.layer_norm_eps, device, dtype)?;
        Ok(Self {
            norm,
            linear,
            policy: PrecisionPolicy::from_parameter_dtype(dtype),
        })
    }

    pub fn norm(&self) -> &LayerNorm {
        &self.norm
    }

    pub fn linear(&self) -> &DuplicateAxisLinear {
        &self.linear
    }

    pub fn parameter_count(&self) -> usize {
        self.norm.parameter_count() + self.linear.linear().parameter_count()
    }

    pub fn forward(&self, embeddings: &NamedTensor) -> Result<NamedTensor> {
        let policy = &self.policy;
        Ok(Sequential::new()
            .then(|x: NamedTensor| self.norm.forward(&x, policy))
            .then(|x: NamedTensor| self.linear.forward(&x, policy))
            .then(|x: NamedTensor| gelu(&x, policy))
            .run(embeddings.clone())?)
    }
}
