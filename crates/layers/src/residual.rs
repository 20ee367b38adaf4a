//! Residual connections for pre-norm transformer blocks.
//!
//! A pre-norm step normalises the running residual stream, feeds the
//! normalised tensor through a branch, and adds the branch output back onto
//! the un-normalised stream: `x + branch(norm(x))`. The branch must return a
//! tensor over exactly the residual stream's axes.

use crate::{
    dtypes::PrecisionPolicy, named::NamedTensor, norm::LayerNorm, LayerError, Result,
};

/// Adds `update` onto `residual`, requiring both to carry the same axes.
pub fn residual_add(
    residual: &NamedTensor,
    update: &NamedTensor,
    policy: &PrecisionPolicy,
) -> Result<NamedTensor> {
    if update.axes().len() != residual.axes().len() {
        return Err(LayerError::InvalidConfig(format!(
            "residual branch produced axes {:?} for stream {:?}",
            update.axes(),
            residual.axes()
        )));
    }
    for axis in residual.axes() {
        update.axis_index(axis, "residual.branch")?;
    }
    let sum = policy
        .cast_for_matmul(residual)?
        .add(&policy.cast_for_matmul(update)?)?;
    policy.cast_to_storage(&sum)
}

/// Pre-norm residual step: `residual + branch(norm(residual))`.
pub fn prenorm_residual<E, F>(
    residual: &NamedTensor,
    norm: &LayerNorm,
    policy: &PrecisionPolicy,
    branch: F,
) -> std::result::Result<NamedTensor, E>
where
    F: FnOnce(&NamedTensor) -> std::result::Result<NamedTensor, E>,
    E: From<LayerError>,
{
    let normed = norm.forward(residual, policy)?;
    let update = branch(&normed)?;
    Ok(residual_add(residual, &update, policy)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use candle_core::{DType, Device};

    fn axes() -> (Axis, Axis) {
        (Axis::new("position", 2), Axis::new("embedding", 3))
    }

    #[test]
    fn branch_sees_normalised_input_and_adds_to_raw_stream() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed) = axes();
        let norm = LayerNorm::init(&embed, 1e-5, &device, DType::F32)?;
        let x = NamedTensor::from_vec(
            vec![1f32, 2., 3., 10., 20., 30.],
            &[pos.clone(), embed.clone()],
            &device,
        )?;
        let policy = PrecisionPolicy::default();
        let mut seen = None;
        let out = prenorm_residual::<LayerError, _>(&x, &norm, &policy, |normed| {
            seen = Some(normed.clone());
            Ok(normed.clone())
        })?;
        let seen = seen.expect("branch was called");
        // Both rows normalise to the same pattern.
        let rows = seen.to_vec_f32(&[pos.clone(), embed.clone()])?;
        for (a, b) in rows[..3].iter().zip(&rows[3..]) {
            assert!((a - b).abs() < 1e-4);
        }
        let expected = x.add(&seen)?;
        assert!(out.max_abs_diff(&expected)? < 1e-6);
        Ok(())
    }

    #[test]
    fn branch_with_different_axes_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed) = axes();
        let norm = LayerNorm::init(&embed, 1e-5, &device, DType::F32)?;
        let x = NamedTensor::zeros(&[pos.clone(), embed], DType::F32, &device)?;
        let policy = PrecisionPolicy::default();
        let result = prenorm_residual::<LayerError, _>(&x, &norm, &policy, |_| {
            NamedTensor::zeros(&[pos.clone(), Axis::new("vocab", 3)], DType::F32, &device)
        });
        assert!(result.is_err());
        Ok(())
    }
}
