//! Mask utilities shared by attention implementations.
//!
//! Masks here are multiplicative `u8` tensors: `1` where a (query, key) pair
//! may attend, `0` where it may not. They carry only the axes they constrain
//! and broadcast over the rest when applied.

pub mod causal;
pub mod padding;

use candle_core::DType;
use layers::{Axis, NamedTensor};

use crate::core::Result;

/// Dtype shared by all masks.
pub const MASK_DTYPE: DType = DType::U8;

pub use causal::causal_mask;
pub use padding::{validity_mask, validity_mask_from_length, validity_mask_from_lengths};

/// Logical AND of two masks over the union of their axes.
pub fn combine_masks_and(a: &NamedTensor, b: &NamedTensor) -> Result<NamedTensor> {
    Ok(validity_mask(a)?.mul(&validity_mask(b)?)?)
}

/// Causal mask over `(query × key)` combined with a validity mask over `key`,
/// broadcast across every query position.
pub fn attention_mask(query: &Axis, key: &Axis, validity: &NamedTensor) -> Result<NamedTensor> {
    let causal = causal_mask(query, key, validity.device())?;
    combine_masks_and(&validity.broadcast_axis(query)?, &causal)
}
