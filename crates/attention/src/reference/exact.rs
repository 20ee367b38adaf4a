//! Scaled dot-product attention weights with large-negative masking.
//!
//! Queries carry the query-key embedding axis and no key-position axis; keys
//! carry both. Axes the two share other than the embedding axis are batch
//! axes, so one call covers every query position and every head at once.
//! Query rows never interact, which makes the result independent of
//! evaluation order across queries.

use std::slice;

use layers::{Axis, NamedTensor, PrecisionPolicy};

use crate::core::{AttentionError, Result};

/// Logit written at masked (query, key) pairs before the softmax.
///
/// A finite fill keeps fully masked rows well defined: they soften to a
/// uniform distribution over the key axis instead of producing NaNs.
pub const MASK_FILL: f64 = -1e9;

/// Post-softmax attention weights over `key_pos`.
///
/// `query` is scaled by `1 / sqrt(|query_key|)`, contracted with `keys` over
/// `query_key`, shifted by `bias` when given, filled with [`MASK_FILL`] where
/// `mask` is zero, and normalised with a softmax along `key_pos`. The result
/// is returned in the policy's reduction dtype.
pub fn dot_product_attention_weights(
    query_key: &Axis,
    key_pos: &Axis,
    query: &NamedTensor,
    keys: &NamedTensor,
    mask: Option<&NamedTensor>,
    bias: Option<&NamedTensor>,
    policy: &PrecisionPolicy,
) -> Result<NamedTensor> {
    query.axis_index(query_key, "attention.query")?;
    keys.axis_index(query_key, "attention.keys")?;
    keys.axis_index(key_pos, "attention.keys")?;
    if query.has_axis(key_pos) {
        return Err(AttentionError::InvalidShape {
            context: format!("query must not carry the key axis {key_pos}"),
        });
    }

    let scale = 1.0 / (query_key.size() as f64).sqrt();
    let query = policy.cast_for_reduction(query)?.scale(scale)?;
    let keys = policy.cast_for_reduction(keys)?;
    let mut logits = query.dot(slice::from_ref(query_key), &keys)?;
    if let Some(bias) = bias {
        logits = logits.add(&policy.cast_for_reduction(bias)?)?;
    }
    if let Some(mask) = mask {
        logits = logits.where_mask(mask, MASK_FILL)?;
    }
    Ok(logits.softmax(key_pos)?)
}

/// Attention weights applied to `values`: the `key_pos`-weighted sum of value
/// vectors, cast back to the storage dtype.
#[allow(clippy::too_many_arguments)]
pub fn dot_product_attention(
    query_key: &Axis,
    key_pos: &Axis,
    query: &NamedTensor,
    keys: &NamedTensor,
    values: &NamedTensor,
    mask: Option<&NamedTensor>,
    bias: Option<&NamedTensor>,
    policy: &PrecisionPolicy,
) -> Result<NamedTensor> {
    values.axis_index(key_pos, "attention.values")?;
    let weights = dot_product_attention_weights(query_key, key_pos, query, keys, mask, bias, policy)?;
    let values = policy.cast_for_reduction(values)?;
    let mixed = weights.dot(slice::from_ref(key_pos), &values)?;
    Ok(policy.cast_to_storage(&mixed)?)
}
