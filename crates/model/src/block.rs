//! One pre-norm transformer layer.

use attention::{Attention, MultiHeadAttention};
use candle_core::Device;
use layers::{
    prenorm_residual, Axis, LayerNorm, Mlp, NamedTensor, PrecisionPolicy, PrngKey, Sequential,
};

use crate::{
    config::GptConfig,
    error::{ModelError, Result},
};

/// `x += attn(ln1(x)); x += mlp(ln2(x))`.
#[derive(Debug, Clone)]
pub struct TransformerLayer {
    ln1: LayerNorm,
    attention: MultiHeadAttention,
    ln2: LayerNorm,
    mlp: Mlp,
    policy: PrecisionPolicy,
}

impl TransformerLayer {
    /// Initialises from `key` split as `[attention, mlp]`. Both norms start at
    /// identity and consume no randomness.
    pub fn init(config: &GptConfig, key: PrngKey, device: &Device) -> Result<Self> {
        let dtype = config.dtype();
        let embed = config.embed_axis();
        let [attention_key, mlp_key] = key.split_array();

        let ln1 = LayerNorm::init(&embed, config.layer_norm_eps, device, dtype)?;
        let attention =
            MultiHeadAttention::init(&config.attention_config(), attention_key, device, dtype)?;
        let ln2 = LayerNorm::init(&embed, config.layer_norm_eps, device, dtype)?;
        let mlp = Mlp::init(&config.feed_forward_config(), mlp_key, device, dtype)?;

        Ok(Self {
            ln1,
            attention,
            ln2,
            mlp,
            policy: PrecisionPolicy::from_parameter_dtype(dtype),
        })
    }

    pub fn attention(&self) -> &MultiHeadAttention {
        &self.attention
    }

    pub fn mlp(&self) -> &Mlp {
        &self.mlp
    }

    pub fn norms(&self) -> (&LayerNorm, &LayerNorm) {
        (&self.ln1, &self.ln2)
    }

    pub fn parameter_count(&self) -> usize {
        self.ln1.parameter_count()
            + self.attention.parameter_count()
            + self.ln2.parameter_count()
            + self.mlp.parameter_count()
    }

    pub fn forward(&self, pos: &Axis, hidden: &NamedTensor, mask: &NamedTensor) -> Result<NamedTensor> {
        Sequential::<NamedTensor, ModelError>::new()
            .then(|x| {
                prenorm_residual(&x, &self.ln1, &self.policy, |normed| {
                    Ok(self.attention.attend(pos, normed, mask)?)
                })
            })
            .then(|x| {
                prenorm_residual(&x, &self.ln2, &self.policy, |normed| {
                    Ok(self.mlp.forward(normed, &self.policy)?)
                })
            })
            .run(hidden.clone())
    }
}
