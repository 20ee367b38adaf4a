//! Validity masks marking real tokens versus padding.

use candle_core::Device;
use layers::{Axis, NamedTensor};

use crate::core::{AttentionError, Result};

/// Normalises a caller mask of any dtype to `u8`: non-zero entries become `1`.
pub fn validity_mask(mask: &NamedTensor) -> Result<NamedTensor> {
    Ok(mask.map(|t| t.ne(0u32))?)
}

/// `1` for the first `valid` positions of `pos`, `0` afterwards.
pub fn validity_mask_from_length(pos: &Axis, valid: usize, device: &Device) -> Result<NamedTensor> {
    let data: Vec<u8> = (0..pos.size()).map(|p| u8::from(p < valid)).collect();
    Ok(NamedTensor::from_vec(data, std::slice::from_ref(pos), device)?)
}

/// Per-batch-element form of [`validity_mask_from_length`], shaped `[batch, pos]`.
pub fn validity_mask_from_lengths(
    batch: &Axis,
    pos: &Axis,
    lengths: &[usize],
    device: &Device,
) -> Result<NamedTensor> {
    if lengths.len() != batch.size() {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "{} lengths supplied for batch axis {batch}",
                lengths.len()
            ),
        });
    }
    let data: Vec<u8> = lengths
        .iter()
        .flat_map(|&valid| (0..pos.size()).map(move |p| u8::from(p < valid)))
        .collect();
    Ok(NamedTensor::from_vec(data, &[batch.clone(), pos.clone()], device)?)
}
