//! Precision and dtype policy utilities used throughout the layers crate.
//!
//! Parameters may reside in `f16`/`bf16` for memory efficiency while matmuls
//! and reductions promote tensors to `f32`. This module exposes
//! [`PrecisionPolicy`] so callers can consistently cast named tensors before
//! matmuls, reductions, or final outputs.

use candle_core::DType;
use serde::{Deserialize, Serialize};

use crate::{named::NamedTensor, Result};

/// Storage precision selectable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

/// Describes how tensors should be cast during different phases of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
    reduction: DType,
}

impl PrecisionPolicy {
    pub fn new(storage: DType, compute: DType, reduction: DType) -> Self {
        Self {
            storage,
            compute,
            reduction,
        }
    }

    /// Builds a policy from the parameter storage dtype.
    pub fn from_parameter_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        let reduction = match storage {
            DType::F64 => DType::F64,
            _ => DType::F32,
        };
        Self::new(storage, compute, reduction)
    }

    /// Returns the dtype used to store parameters and outputs.
    pub fn storage(&self) -> DType {
        self.storage
    }

    /// Returns the dtype used for matmuls and activation evaluation.
    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Returns the dtype used for reductions such as layer norm statistics.
    pub fn reduction(&self) -> DType {
        self.reduction
    }

    pub fn cast_for_matmul(&self, tensor: &NamedTensor) -> Result<NamedTensor> {
        tensor.to_dtype(self.compute)
    }

    pub fn cast_for_reduction(&self, tensor: &NamedTensor) -> Result<NamedTensor> {
        tensor.to_dtype(self.reduction)
    }

    pub fn cast_to_storage(&self, tensor: &NamedTensor) -> Result<NamedTensor> {
        tensor.to_dtype(self.storage)
    }
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self::from_parameter_dtype(DType::F32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use candle_core::Device;

    #[test]
    fn policy_promotes_reduced_precision_parameters() {
        let policy = PrecisionPolicy::from_parameter_dtype(Precision::F16.dtype());
        assert_eq!(policy.storage(), DType::F16);
        assert_eq!(policy.compute(), DType::F32);
        assert_eq!(policy.reduction(), DType::F32);
        assert_eq!(PrecisionPolicy::default().storage(), DType::F32);
    }

    #[test]
    fn cast_round_trip_preserves_values_within_tolerance() -> Result<()> {
        let device = Device::Cpu;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::BF16);
        let axis = Axis::new("embedding", 3);
        let base = NamedTensor::from_vec(vec![0.125f32, -0.75, 3.5], &[axis], &device)?;
        let storage = policy.cast_to_storage(&base)?;
        assert_eq!(storage.dtype(), DType::BF16);

        let compute = policy.cast_for_matmul(&storage)?;
        assert_eq!(compute.dtype(), DType::F32);
        assert!(compute.max_abs_diff(&base)? <= 2e-2);
        Ok(())
    }
}
