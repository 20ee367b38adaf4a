//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise axis and dtype assertions that can be wired
//! into constructors or forward paths. They return [`crate::Result`] so call
//! sites can propagate errors without panicking.

use candle_core::{DType, Tensor};

use crate::{axis::Axis, LayerError, Result};

/// Position of `axis` within `axes`, checking that the sizes agree.
pub fn find_axis(axes: &[Axis], axis: &Axis, context: &'static str) -> Result<usize> {
    match axes.iter().position(|candidate| candidate.same_name(axis)) {
        Some(index) => {
            let actual = axes[index].size();
            if actual == axis.size() {
                Ok(index)
            } else {
                Err(LayerError::AxisMismatch {
                    axis: axis.name().to_string(),
                    expected: axis.size(),
                    actual,
                    context,
                })
            }
        }
        None => Err(LayerError::MissingAxis {
            axis: axis.name().to_string(),
            available: axes.iter().map(|a| a.name().to_string()).collect(),
            context,
        }),
    }
}

/// Rejects axis lists that repeat a name.
pub fn expect_unique(axes: &[Axis], context: &'static str) -> Result<()> {
    for (i, axis) in axes.iter().enumerate() {
        if axes[..i].iter().any(|earlier| earlier.same_name(axis)) {
            return Err(LayerError::DuplicateAxis {
                axis: axis.name().to_string(),
                context,
            });
        }
    }
    Ok(())
}

/// Ensures every same-named pair across `a` and `b` has the same size.
pub fn expect_compatible(a: &[Axis], b: &[Axis], context: &'static str) -> Result<()> {
    for axis in b {
        if let Some(existing) = a.iter().find(|candidate| candidate.same_name(axis)) {
            if existing.size() != axis.size() {
                return Err(LayerError::AxisMismatch {
                    axis: axis.name().to_string(),
                    expected: existing.size(),
                    actual: axis.size(),
                    context,
                });
            }
        }
    }
    Ok(())
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(context: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(LayerError::InvalidConfig(format!(
            "{context}: expected dtype in {allowed:?}, got {dtype:?}"
        )))
    }
}

/// Floating dtypes accepted for parameters and activations.
pub const FLOAT_DTYPES: &[DType] = &[DType::F16, DType::BF16, DType::F32, DType::F64];
