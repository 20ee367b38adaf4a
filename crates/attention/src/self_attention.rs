//! Single-head causal self-attention.

use std::slice;

use candle_core::{DType, Device};
use layers::{axis::names, Axis, Linear, NamedTensor, PrecisionPolicy, PrngKey};
use log::trace;

use crate::{
    core::{Attention, AttentionConfig, AttentionError, Result},
    masks,
    reference::{dot_product_attention, dot_product_attention_weights},
};

/// Query/key/value projections for one head.
///
/// A stacked instance (see [`SelfAttention::stack`]) carries an extra leading
/// axis on every projection weight and evaluates all heads in one call; the
/// stacking axis then appears on its outputs.
#[derive(Debug, Clone)]
pub struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    embed: Axis,
    query_key: Axis,
    value_embed: Axis,
    policy: PrecisionPolicy,
}

/// Projected inputs for one attention call.
struct Prepared {
    query_pos: Axis,
    key_pos: Axis,
    queries: NamedTensor,
    keys: NamedTensor,
    values: NamedTensor,
    mask: NamedTensor,
}

impl SelfAttention {
    /// Initialises the three projections from `key` split as `[query, key, value]`.
    pub fn init(config: &AttentionConfig, key: PrngKey, device: &Device, dtype: DType) -> Result<Self> {
        config.validate()?;
        let embed = config.embed_axis();
        let query_key = config.query_key_axis();
        let value_embed = config.value_axis();
        let [query_key_rng, key_rng, value_rng] = key.split_array();
        let project = |out: &Axis, rng: PrngKey| {
            Linear::init(
                slice::from_ref(&embed),
                slice::from_ref(out),
                true,
                &config.init,
                rng,
                device,
                dtype,
            )
        };
        let query = project(&query_key, query_key_rng)?;
        let key = project(&query_key, key_rng)?;
        let value = project(&value_embed, value_rng)?;
        Ok(Self {
            query,
            key,
            value,
            embed,
            query_key,
            value_embed,
            policy: PrecisionPolicy::from_parameter_dtype(dtype),
        })
    }

    /// Stacks independently initialised heads along `axis`.
    pub fn stack(axis: &Axis, heads: &[SelfAttention]) -> Result<Self> {
        let first = heads.first().ok_or_else(|| AttentionError::InvalidShape {
            context: "cannot stack zero attention heads".into(),
        })?;
        Ok(Self {
            query: stack_projection(axis, heads, |h| &h.query)?,
            key: stack_projection(axis, heads, |h| &h.key)?,
            value: stack_projection(axis, heads, |h| &h.value)?,
            embed: first.embed.clone(),
            query_key: first.query_key.clone(),
            value_embed: first.value_embed.clone(),
            policy: first.policy,
        })
    }

    pub fn query(&self) -> &Linear {
        &self.query
    }

    pub fn key(&self) -> &Linear {
        &self.key
    }

    pub fn value(&self) -> &Linear {
        &self.value
    }

    pub fn embed_axis(&self) -> &Axis {
        &self.embed
    }

    pub fn query_key_axis(&self) -> &Axis {
        &self.query_key
    }

    pub fn value_axis(&self) -> &Axis {
        &self.value_embed
    }

    pub fn parameter_count(&self) -> usize {
        self.query.parameter_count() + self.key.parameter_count() + self.value.parameter_count()
    }

    /// Post-softmax weights over `(query_position × key_value_position)`, plus
    /// any head or batch axes, in the reduction dtype.
    pub fn attention_weights(
        &self,
        pos: &Axis,
        embeddings: &NamedTensor,
        mask: &NamedTensor,
    ) -> Result<NamedTensor> {
        let prepared = self.prepare(pos, embeddings, mask)?;
        self.weights(&prepared)
    }

    fn prepare(&self, pos: &Axis, embeddings: &NamedTensor, mask: &NamedTensor) -> Result<Prepared> {
        embeddings.axis_index(pos, "self_attention.embeddings")?;
        embeddings.axis_index(&self.embed, "self_attention.embeddings")?;
        mask.axis_index(pos, "self_attention.mask")?;

        let query_pos = pos.alias(names::QUERY_POSITION);
        let key_pos = pos.alias(names::KEY_POSITION);
        let validity = mask.rename(pos, &key_pos)?;
        let mask = masks::attention_mask(&query_pos, &key_pos, &validity)?;

        let queries = self.query.forward(embeddings, &self.policy)?.rename(pos, &query_pos)?;
        let keys = self.key.forward(embeddings, &self.policy)?.rename(pos, &key_pos)?;
        let values = self.value.forward(embeddings, &self.policy)?.rename(pos, &key_pos)?;
        Ok(Prepared {
            query_pos,
            key_pos,
            queries,
            keys,
            values,
            mask,
        })
    }

    fn weights(&self, prepared: &Prepared) -> Result<NamedTensor> {
        dot_product_attention_weights(
            &self.query_key,
            &prepared.key_pos,
            &prepared.queries,
            &prepared.keys,
            Some(&prepared.mask),
            None,
            &self.policy,
        )
    }
}

fn stack_projection(
    axis: &Axis,
    heads: &[SelfAttention],
    select: impl Fn(&SelfAttention) -> &Linear,
) -> Result<Linear> {
    let linears: Vec<Linear> = heads.iter().map(|head| select(head).clone()).collect();
    Ok(Linear::stack(axis, &linears)?)
}

impl Attention for SelfAttention {
    fn attend(&self, pos: &Axis, embeddings: &NamedTensor, mask: &NamedTensor) -> Result<NamedTensor> {
        trace!("self_attention pos={pos} input={:?}", embeddings.axes());
        let prepared = self.prepare(pos, embeddings, mask)?;
        let mixed = dot_product_attention(
            &self.query_key,
            &prepared.key_pos,
            &prepared.queries,
            &prepared.keys,
            &prepared.values,
            Some(&prepared.mask),
            None,
            &self.policy,
        )?;
        Ok(mixed.rename(&prepared.query_pos, pos)?)
    }
}
