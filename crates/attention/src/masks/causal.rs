//! Builders for causal attention masks.

use candle_core::Device;
use layers::{Axis, NamedTensor};

use crate::core::Result;

/// Construct a causal mask over `[query, key]`.
///
/// Entry `(q, k)` is `1` iff `k <= q`. When `key` is longer than `query`,
/// queries are assumed to align with the most recent keys, allowing access to
/// the extended prefix.
pub fn causal_mask(query: &Axis, key: &Axis, device: &Device) -> Result<NamedTensor> {
    let (q_len, k_len) = (query.size(), key.size());
    let offset = k_len.saturating_sub(q_len);
    let data: Vec<u8> = (0..q_len)
        .flat_map(|q| (0..k_len).map(move |k| u8::from(k <= q + offset)))
        .collect();
    Ok(NamedTensor::from_vec(data, &[query.clone(), key.clone()], device)?)
}
