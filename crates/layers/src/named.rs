//! Tensors whose dimensions are addressed by [`Axis`] rather than position.
//!
//! A [`NamedTensor`] pairs a Candle tensor with one axis per dimension. The
//! physical dimension order is an implementation detail: every operation here
//! looks axes up by name, permutes as needed, and reports the resulting axis
//! list. Operations that meet the same axis name with two sizes fail with
//! [`LayerError::AxisMismatch`]; axes an operation does not mention pass
//! through untouched, which is how a caller-side `batch` axis (or the stacked
//! `head` axis of multi-head attention) flows through every component.

use candle_core::{DType, Device, Tensor, WithDType};

use crate::{
    axis::{self, Axis},
    checks, LayerError, Result,
};

/// Dense tensor with named, order-independent dimensions.
#[derive(Debug, Clone)]
pub struct NamedTensor {
    tensor: Tensor,
    axes: Vec<Axis>,
}

impl NamedTensor {
    /// Tags `tensor` with `axes`, which must match its rank and sizes.
    pub fn new(tensor: Tensor, axes: impl Into<Vec<Axis>>) -> Result<Self> {
        let axes = axes.into();
        checks::expect_unique(&axes, "named tensor")?;
        let dims = tensor.dims();
        if dims.len() != axes.len() {
            return Err(LayerError::InvalidConfig(format!(
                "tensor of rank {} cannot carry axes {:?}",
                dims.len(),
                axis_names(&axes)
            )));
        }
        for (axis, &dim) in axes.iter().zip(dims) {
            if axis.size() != dim {
                return Err(LayerError::AxisMismatch {
                    axis: axis.name().to_string(),
                    expected: axis.size(),
                    actual: dim,
                    context: "named tensor",
                });
            }
        }
        Ok(Self { tensor, axes })
    }

    /// Builds a tensor from row-major `data` laid out along `axes`.
    pub fn from_vec<T: WithDType>(data: Vec<T>, axes: &[Axis], device: &Device) -> Result<Self> {
        let tensor = Tensor::from_vec(data, axis::sizes(axes), device)?;
        Self::new(tensor, axes.to_vec())
    }

    pub fn zeros(axes: &[Axis], dtype: DType, device: &Device) -> Result<Self> {
        let tensor = Tensor::zeros(axis::sizes(axes), dtype, device)?;
        Self::new(tensor, axes.to_vec())
    }

    pub fn ones(axes: &[Axis], dtype: DType, device: &Device) -> Result<Self> {
        let tensor = Tensor::ones(axis::sizes(axes), dtype, device)?;
        Self::new(tensor, axes.to_vec())
    }

    /// `0..axis.size()` as `u32` indices along `axis`.
    pub fn arange(axis: &Axis, device: &Device) -> Result<Self> {
        let tensor = Tensor::arange(0u32, axis.size() as u32, device)?;
        Self::new(tensor, vec![axis.clone()])
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn dtype(&self) -> DType {
        self.tensor.dtype()
    }

    pub fn device(&self) -> &Device {
        self.tensor.device()
    }

    /// Whether an axis with the same name is present (sizes are not compared).
    pub fn has_axis(&self, axis: &Axis) -> bool {
        self.axes.iter().any(|candidate| candidate.same_name(axis))
    }

    /// Dimension index of `axis`, validating its size.
    pub fn axis_index(&self, axis: &Axis, context: &'static str) -> Result<usize> {
        checks::find_axis(&self.axes, axis, context)
    }

    /// Replaces axis `from` by `to`; both must have the same size.
    pub fn rename(&self, from: &Axis, to: &Axis) -> Result<Self> {
        let index = self.axis_index(from, "rename")?;
        if from.size() != to.size() {
            return Err(LayerError::AxisMismatch {
                axis: to.name().to_string(),
                expected: from.size(),
                actual: to.size(),
                context: "rename",
            });
        }
        let mut axes = self.axes.clone();
        axes[index] = to.clone();
        checks::expect_unique(&axes, "rename")?;
        Ok(Self {
            tensor: self.tensor.clone(),
            axes,
        })
    }

    /// Permutes the physical layout to `order`, which must name exactly this
    /// tensor's axes.
    pub fn rearrange(&self, order: &[Axis]) -> Result<Self> {
        if order.len() != self.axes.len() {
            return Err(LayerError::InvalidConfig(format!(
                "cannot rearrange {:?} into {:?}",
                axis_names(&self.axes),
                axis_names(order)
            )));
        }
        checks::expect_unique(order, "rearrange")?;
        let permutation = order
            .iter()
            .map(|axis| self.axis_index(axis, "rearrange"))
            .collect::<Result<Vec<_>>>()?;
        if permutation.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }
        let tensor = self.tensor.permute(permutation)?.contiguous()?;
        Ok(Self {
            tensor,
            axes: order.to_vec(),
        })
    }

    /// Broadcasts onto `target`, a superset of this tensor's axes.
    pub fn broadcast_to(&self, target: &[Axis]) -> Result<Self> {
        checks::expect_unique(target, "broadcast")?;
        for axis in &self.axes {
            checks::find_axis(target, axis, "broadcast")?;
        }
        let present: Vec<Axis> = target
            .iter()
            .filter(|axis| self.has_axis(axis))
            .cloned()
            .collect();
        let aligned = self.rearrange(&present)?;
        let expanded: Vec<usize> = target
            .iter()
            .map(|axis| if self.has_axis(axis) { axis.size() } else { 1 })
            .collect();
        let tensor = aligned
            .tensor
            .reshape(expanded)?
            .broadcast_as(axis::sizes(target))?;
        Ok(Self {
            tensor,
            axes: target.to_vec(),
        })
    }

    /// Repeats the tensor along a new leading `axis`.
    pub fn broadcast_axis(&self, axis: &Axis) -> Result<Self> {
        let mut target = Vec::with_capacity(self.axes.len() + 1);
        target.push(axis.clone());
        target.extend(self.axes.iter().cloned());
        self.broadcast_to(&target)
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "add", |a, b| a.add(b))
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "sub", |a, b| a.sub(b))
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "mul", |a, b| a.mul(b))
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: f64) -> Result<Self> {
        self.map(|t| t.affine(factor, 0.0))
    }

    /// Applies a shape-preserving tensor function, keeping the axes.
    pub fn map<F>(&self, f: F) -> Result<Self>
    where
        F: FnOnce(&Tensor) -> candle_core::Result<Tensor>,
    {
        let tensor = f(&self.tensor)?;
        Self::new(tensor, self.axes.clone())
    }

    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        self.map(|t| t.to_dtype(dtype))
    }

    /// Contracts `contract` between `self` and `other`.
    ///
    /// Axes present in both operands but not contracted are treated as batch
    /// axes. The result carries the batch axes, then the remaining axes of
    /// `self`, then the remaining axes of `other`.
    pub fn dot(&self, contract: &[Axis], other: &Self) -> Result<Self> {
        checks::expect_unique(contract, "dot")?;
        for axis in contract {
            self.axis_index(axis, "dot")?;
            other.axis_index(axis, "dot")?;
        }
        checks::expect_compatible(&self.axes, &other.axes, "dot")?;

        let contracted = |axis: &Axis| contract.iter().any(|c| c.same_name(axis));
        let shared: Vec<Axis> = self
            .axes
            .iter()
            .filter(|axis| !contracted(axis) && other.has_axis(axis))
            .cloned()
            .collect();
        let lhs_free: Vec<Axis> = self
            .axes
            .iter()
            .filter(|axis| !contracted(axis) && !other.has_axis(axis))
            .cloned()
            .collect();
        let rhs_free: Vec<Axis> = other
            .axes
            .iter()
            .filter(|axis| !contracted(axis) && !self.has_axis(axis))
            .cloned()
            .collect();

        let batch = axis::volume(&shared);
        let rows = axis::volume(&lhs_free);
        let inner = axis::volume(contract);
        let cols = axis::volume(&rhs_free);

        let lhs_order = [shared.as_slice(), lhs_free.as_slice(), contract].concat();
        let rhs_order = [shared.as_slice(), contract, rhs_free.as_slice()].concat();
        let lhs = self
            .rearrange(&lhs_order)?
            .tensor
            .reshape((batch, rows, inner))?;
        let rhs = other
            .rearrange(&rhs_order)?
            .tensor
            .reshape((batch, inner, cols))?;
        let product = lhs.matmul(&rhs)?;

        let axes = [shared, lhs_free, rhs_free].concat();
        let tensor = product.reshape(axis::sizes(&axes))?;
        Self::new(tensor, axes)
    }

    /// Softmax along `axis`.
    pub fn softmax(&self, axis: &Axis) -> Result<Self> {
        let index = self.axis_index(axis, "softmax")?;
        let tensor = candle_nn::ops::softmax(&self.tensor, index)?;
        Self::new(tensor, self.axes.clone())
    }

    /// Keeps entries where `mask` is non-zero and writes `fill` elsewhere.
    ///
    /// `mask` may carry any subset of this tensor's axes; it is broadcast over
    /// the rest.
    pub fn where_mask(&self, mask: &NamedTensor, fill: f64) -> Result<Self> {
        let condition = mask.broadcast_to(&self.axes)?.tensor.ne(0u32)?;
        let fill = Tensor::new(fill as f32, self.device())?
            .to_dtype(self.dtype())?
            .broadcast_as(self.tensor.shape())?;
        let tensor = condition.where_cond(&self.tensor, &fill)?;
        Self::new(tensor, self.axes.clone())
    }

    /// Gathers entries along `axis` using the integer tensor `ids`.
    ///
    /// `axis` is replaced in the result by the axes of `ids`.
    pub fn take(&self, axis: &Axis, ids: &NamedTensor) -> Result<Self> {
        let index = self.axis_index(axis, "take")?;
        if !ids.dtype().is_int() {
            return Err(LayerError::InvalidConfig(format!(
                "take expects integer ids, got {:?}",
                ids.dtype()
            )));
        }
        let flat = ids.tensor.flatten_all()?;
        let gathered = self.tensor.index_select(&flat, index)?;

        let mut axes = self.axes[..index].to_vec();
        axes.extend(ids.axes.iter().cloned());
        axes.extend(self.axes[index + 1..].iter().cloned());
        let tensor = gathered.reshape(axis::sizes(&axes))?;
        Self::new(tensor, axes)
    }

    /// Selects entry `position` along `axis`, dropping that axis.
    pub fn index(&self, axis: &Axis, position: usize) -> Result<Self> {
        let index = self.axis_index(axis, "index")?;
        if position >= axis.size() {
            return Err(LayerError::InvalidConfig(format!(
                "index {position} out of bounds for axis {axis}"
            )));
        }
        let tensor = self.tensor.narrow(index, position, 1)?.squeeze(index)?;
        let mut axes = self.axes.clone();
        axes.remove(index);
        Self::new(tensor, axes)
    }

    /// Stacks tensors with identical axis sets along a new leading `axis`.
    pub fn stack(axis: &Axis, parts: &[NamedTensor]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| LayerError::InvalidConfig("stack requires at least one tensor".into()))?;
        if axis.size() != parts.len() {
            return Err(LayerError::AxisMismatch {
                axis: axis.name().to_string(),
                expected: axis.size(),
                actual: parts.len(),
                context: "stack",
            });
        }
        let tensors = parts
            .iter()
            .map(|part| part.rearrange(&first.axes).map(|aligned| aligned.tensor))
            .collect::<Result<Vec<_>>>()?;
        let tensor = Tensor::stack(&tensors, 0)?;
        let mut axes = Vec::with_capacity(first.axes.len() + 1);
        axes.push(axis.clone());
        axes.extend(first.axes.iter().cloned());
        Self::new(tensor, axes)
    }

    /// Flattens the values in the physical order given by `order`.
    pub fn to_vec_f32(&self, order: &[Axis]) -> Result<Vec<f32>> {
        let aligned = self.rearrange(order)?;
        Ok(aligned
            .tensor
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?)
    }

    /// Largest absolute elementwise difference, comparing by axis name.
    pub fn max_abs_diff(&self, other: &Self) -> Result<f32> {
        let other = other.rearrange(&self.axes)?;
        let diff = self
            .tensor
            .to_dtype(DType::F32)?
            .sub(&other.tensor.to_dtype(DType::F32)?)?
            .abs()?
            .max_all()?
            .to_scalar::<f32>()?;
        Ok(diff)
    }

    fn zip_with<F>(&self, other: &Self, context: &'static str, op: F) -> Result<Self>
    where
        F: FnOnce(&Tensor, &Tensor) -> candle_core::Result<Tensor>,
    {
        checks::expect_compatible(&self.axes, &other.axes, context)?;
        let mut axes = self.axes.clone();
        axes.extend(other.axes.iter().filter(|a| !self.has_axis(a)).cloned());
        let lhs = self.broadcast_to(&axes)?;
        let rhs = other.broadcast_to(&axes)?;
        let tensor = op(&lhs.tensor, &rhs.tensor)?;
        Self::new(tensor, axes)
    }
}

fn axis_names(axes: &[Axis]) -> Vec<String> {
    axes.iter().map(|axis| axis.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Axis {
        Axis::new("position", 3)
    }

    fn embed() -> Axis {
        Axis::new("embedding", 2)
    }

    fn sample(device: &Device) -> Result<NamedTensor> {
        NamedTensor::from_vec(
            vec![1f32, 2., 3., 4., 5., 6.],
            &[pos(), embed()],
            device,
        )
    }

    #[test]
    fn new_rejects_wrong_sizes() {
        let device = Device::Cpu;
        let tensor = Tensor::zeros((3, 2), DType::F32, &device).unwrap();
        let err = NamedTensor::new(tensor, vec![pos(), Axis::new("embedding", 5)]).unwrap_err();
        assert!(matches!(err, LayerError::AxisMismatch { .. }));
    }

    #[test]
    fn rearrange_addresses_by_name() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let transposed = x.rearrange(&[embed(), pos()])?;
        assert_eq!(
            transposed.to_vec_f32(&[embed(), pos()])?,
            vec![1., 3., 5., 2., 4., 6.]
        );
        // Reading back in the original order recovers the original data.
        assert_eq!(transposed.to_vec_f32(&[pos(), embed()])?, x.to_vec_f32(&[pos(), embed()])?);
        Ok(())
    }

    #[test]
    fn add_broadcasts_over_missing_axes() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let bias = NamedTensor::from_vec(vec![10f32, 20.], &[embed()], &device)?;
        let out = bias.add(&x)?;
        assert_eq!(out.axes(), &[embed(), pos()]);
        assert_eq!(
            out.to_vec_f32(&[pos(), embed()])?,
            vec![11., 22., 13., 24., 15., 26.]
        );
        Ok(())
    }

    #[test]
    fn add_rejects_conflicting_sizes() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let other = NamedTensor::zeros(&[Axis::new("embedding", 4)], DType::F32, &device)?;
        assert!(matches!(
            x.add(&other),
            Err(LayerError::AxisMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn dot_contracts_and_batches_shared_axes() -> Result<()> {
        let device = Device::Cpu;
        let head = Axis::new("head", 2);
        let out_axis = Axis::new("out", 1);
        let x = sample(&device)?;
        // weight[head, out, embedding]
        let weight = NamedTensor::from_vec(
            vec![1f32, 0., 0., 1.],
            &[head.clone(), out_axis.clone(), embed()],
            &device,
        )?;
        let y = x.dot(&[embed()], &weight)?;
        assert_eq!(y.axes(), &[pos(), head.clone(), out_axis.clone()]);
        assert_eq!(
            y.to_vec_f32(&[head.clone(), pos(), out_axis.clone()])?,
            vec![1., 3., 5., 2., 4., 6.]
        );

        // Shared `head` axis is batched rather than contracted.
        let per_head = NamedTensor::from_vec(
            vec![1f32, 1., 2., 2.],
            &[head.clone(), embed()],
            &device,
        )?;
        let z = per_head.dot(&[embed()], &x.broadcast_axis(&head)?)?;
        assert_eq!(z.axes(), &[head.clone(), pos()]);
        assert_eq!(z.to_vec_f32(&[head, pos()])?, vec![3., 7., 11., 6., 14., 22.]);
        Ok(())
    }

    #[test]
    fn where_mask_fills_masked_entries() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let mask = NamedTensor::from_vec(vec![1u8, 0, 1], &[pos()], &device)?;
        let filled = x.where_mask(&mask, -1e9)?;
        assert_eq!(
            filled.to_vec_f32(&[pos(), embed()])?,
            vec![1., 2., -1e9, -1e9, 5., 6.]
        );
        Ok(())
    }

    #[test]
    fn take_replaces_axis_with_index_axes() -> Result<()> {
        let device = Device::Cpu;
        let table = sample(&device)?;
        let seq = Axis::new("seq", 2);
        let ids = NamedTensor::from_vec(vec![2u32, 0], &[seq.clone()], &device)?;
        let gathered = table.take(&pos(), &ids)?;
        assert_eq!(gathered.axes(), &[seq.clone(), embed()]);
        assert_eq!(gathered.to_vec_f32(&[seq, embed()])?, vec![5., 6., 1., 2.]);
        Ok(())
    }

    #[test]
    fn softmax_normalises_along_axis() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let probs = x.softmax(&pos())?;
        let values = probs.to_vec_f32(&[embed(), pos()])?;
        for row in values.chunks(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn stack_prepends_axis() -> Result<()> {
        let device = Device::Cpu;
        let x = sample(&device)?;
        let layer = Axis::new("layer", 2);
        let stacked = NamedTensor::stack(&layer, &[x.clone(), x.rearrange(&[embed(), pos()])?])?;
        assert_eq!(stacked.axes(), &[layer.clone(), pos(), embed()]);
        assert_eq!(stacked.index(&layer, 1)?.max_abs_diff(&x)?, 0.0);
        Ok(())
    }
}
