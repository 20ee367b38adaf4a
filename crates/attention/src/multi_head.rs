//! Multi-head causal self-attention.

use candle_core::{DType, Device};
use layers::{Axis, Linear, NamedTensor, PrecisionPolicy, PrngKey};
use log::{debug, trace};

use crate::{
    core::{Attention, AttentionConfig, Result},
    self_attention::SelfAttention,
};

/// `num_heads` independent [`SelfAttention`] heads stacked along the `head`
/// axis, recombined by a write-out projection over `(head × value_embedding)`.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    heads: SelfAttention,
    write_out: Linear,
    head: Axis,
    policy: PrecisionPolicy,
}

impl MultiHeadAttention {
    /// Initialises from `key` split as `[heads, write_out]`; the heads key is
    /// split once more into one key per head, in head order.
    pub fn init(config: &AttentionConfig, key: PrngKey, device: &Device, dtype: DType) -> Result<Self> {
        config.validate()?;
        let head = config.head_axis();
        let [heads_key, write_out_key] = key.split_array();
        let heads = heads_key
            .split(head.size())
            .into_iter()
            .map(|head_key| SelfAttention::init(config, head_key, device, dtype))
            .collect::<Result<Vec<_>>>()?;
        let heads = SelfAttention::stack(&head, &heads)?;
        let write_out = Linear::init(
            &[head.clone(), config.value_axis()],
            &[config.embed_axis()],
            true,
            &config.init,
            write_out_key,
            device,
            dtype,
        )?;
        debug!(
            "multi-head attention initialised: heads={} qk={} v={} embed={}",
            config.num_heads, config.query_key_size, config.value_size, config.embedding_size
        );
        Ok(Self {
            heads,
            write_out,
            head,
            policy: PrecisionPolicy::from_parameter_dtype(dtype),
        })
    }

    /// Stacked per-head projections.
    pub fn heads(&self) -> &SelfAttention {
        &self.heads
    }

    pub fn write_out(&self) -> &Linear {
        &self.write_out
    }

    pub fn head_axis(&self) -> &Axis {
        &self.head
    }

    pub fn parameter_count(&self) -> usize {
        self.heads.parameter_count() + self.write_out.parameter_count()
    }

    /// Per-head attention weights, carrying the `head` axis alongside the
    /// query and key position axes.
    pub fn attention_weights(
        &self,
        pos: &Axis,
        embeddings: &NamedTensor,
        mask: &NamedTensor,
    ) -> Result<NamedTensor> {
        self.heads.attention_weights(pos, embeddings, mask)
    }
}

impl Attention for MultiHeadAttention {
    fn attend(&self, pos: &Axis, embeddings: &NamedTensor, mask: &NamedTensor) -> Result<NamedTensor> {
        trace!("multi_head_attention pos={pos} heads={}", self.head.size());
        let per_head = self.heads.attend(pos, embeddings, mask)?;
        Ok(self.write_out.forward(&per_head, &self.policy)?)
    }
}
