//! Linear and affine projection helpers.
//!
//! A [`Linear`] maps a tensor carrying its input axes to one carrying its
//! output axes, leaving every other axis untouched. Several input axes may be
//! contracted at once (the multi-head write-out reads `head × value_embedding`).
//! The weight is stored over `output ++ input` axes; a stacked linear carries
//! additional leading axes (for example `head`) and evaluates every slice in a
//! single contraction. Matmuls run in [`PrecisionPolicy::compute`] and results
//! are cast back with [`PrecisionPolicy::cast_to_storage`].

use candle_core::{DType, Device};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    axis::{self, Axis},
    checks,
    dtypes::PrecisionPolicy,
    named::NamedTensor,
    prng::PrngKey,
    LayerError, Result,
};

/// Supported weight initialisation policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearInit {
    /// Zero-mean normal with a fixed standard deviation.
    Normal { std: f64 },
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
}

impl Default for LinearInit {
    fn default() -> Self {
        LinearInit::Normal { std: 0.02 }
    }
}

impl LinearInit {
    /// Standard deviation for a weight with the given fan-in and fan-out.
    pub fn std(&self, fan_in: usize, fan_out: usize) -> f64 {
        match self {
            LinearInit::Normal { std } => *std,
            LinearInit::XavierNormal => (2.0 / (fan_in + fan_out) as f64).sqrt(),
        }
    }
}

/// Dense affine projection over named axes.
#[derive(Debug, Clone)]
pub struct Linear {
    input: Vec<Axis>,
    output: Vec<Axis>,
    weight: NamedTensor,
    bias: Option<NamedTensor>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    ///
    /// `weight` must carry every input and output axis; any further axes are
    /// treated as stacking axes. `bias`, when present, must carry the output
    /// axes and no input axis.
    pub fn new(
        input: Vec<Axis>,
        output: Vec<Axis>,
        weight: NamedTensor,
        bias: Option<NamedTensor>,
    ) -> Result<Self> {
        if input.is_empty() || output.is_empty() {
            return Err(LayerError::InvalidConfig(
                "linear requires at least one input and one output axis".into(),
            ));
        }
        let joint = [output.as_slice(), input.as_slice()].concat();
        checks::expect_unique(&joint, "linear axes")?;
        for axis in &joint {
            weight.axis_index(axis, "linear.weight")?;
        }
        checks::expect_dtype_in("linear.weight", weight.tensor(), checks::FLOAT_DTYPES)?;
        if let Some(bias) = &bias {
            for axis in &output {
                bias.axis_index(axis, "linear.bias")?;
            }
            for axis in bias.axes() {
                if input.iter().any(|i| i.same_name(axis)) || !weight.has_axis(axis) {
                    return Err(LayerError::InvalidConfig(format!(
                        "linear.bias axis {axis} is not an output or stacking axis"
                    )));
                }
            }
        }
        Ok(Self {
            input,
            output,
            weight,
            bias,
        })
    }

    /// Builds a linear layer whose weight is sampled from `init` using `key`.
    /// The bias, when enabled, starts at zero.
    pub fn init(
        input: &[Axis],
        output: &[Axis],
        use_bias: bool,
        init: &LinearInit,
        key: PrngKey,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let joint = [output, input].concat();
        let std = init.std(axis::volume(input), axis::volume(output));
        let weight = key.normal_tensor(&joint, std, device)?.to_dtype(dtype)?;
        let bias = if use_bias {
            Some(NamedTensor::zeros(output, dtype, device)?)
        } else {
            None
        };
        Self::new(input.to_vec(), output.to_vec(), weight, bias)
    }

    /// Stacks independently initialised linears along a new leading `axis`.
    pub fn stack(axis: &Axis, linears: &[Linear]) -> Result<Self> {
        let first = linears
            .first()
            .ok_or_else(|| LayerError::InvalidConfig("cannot stack zero linears".into()))?;
        for other in linears {
            if other.input != first.input || other.output != first.output {
                return Err(LayerError::InvalidConfig(
                    "stacked linears must share input and output axes".into(),
                ));
            }
        }
        trace!("stacking {} linears along {axis}", linears.len());
        let weights: Vec<NamedTensor> = linears.iter().map(|l| l.weight.clone()).collect();
        let weight = NamedTensor::stack(axis, &weights)?;
        let bias = match linears
            .iter()
            .map(|l| l.bias.clone())
            .collect::<Option<Vec<_>>>()
        {
            Some(biases) => Some(NamedTensor::stack(axis, &biases)?),
            None if linears.iter().all(|l| l.bias.is_none()) => None,
            None => {
                return Err(LayerError::InvalidConfig(
                    "stacked linears must agree on bias usage".into(),
                ))
            }
        };
        Self::new(first.input.clone(), first.output.clone(), weight, bias)
    }

    pub fn input_axes(&self) -> &[Axis] {
        &self.input
    }

    pub fn output_axes(&self) -> &[Axis] {
        &self.output
    }

    pub fn weight(&self) -> &NamedTensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&NamedTensor> {
        self.bias.as_ref()
    }

    /// Number of scalar parameters held by this layer.
    pub fn parameter_count(&self) -> usize {
        let weight = self.weight.tensor().elem_count();
        weight + self.bias.as_ref().map_or(0, |b| b.tensor().elem_count())
    }

    /// Applies the projection, promoting to the compute dtype for the matmul.
    pub fn forward(&self, hidden: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor> {
        for axis in &self.input {
            hidden.axis_index(axis, "linear.input")?;
        }
        if let Some(clash) = self.output.iter().find(|axis| hidden.has_axis(axis)) {
            return Err(LayerError::DuplicateAxis {
                axis: clash.name().to_string(),
                context: "linear.input already carries an output axis",
            });
        }

        let input = policy.cast_for_matmul(hidden)?;
        let weight = policy.cast_for_matmul(&self.weight)?;
        let mut output = input.dot(&self.input, &weight)?;
        if let Some(bias) = &self.bias {
            output = output.add(&policy.cast_for_matmul(bias)?)?;
        }
        policy.cast_to_storage(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn axes() -> (Axis, Axis, Axis) {
        (
            Axis::new("position", 2),
            Axis::new("embedding", 3),
            Axis::new("out", 2),
        )
    }

    #[test]
    fn forward_matches_manual_affine_map() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed, out) = axes();
        let weight = NamedTensor::from_vec(
            vec![1f32, 0., -1., 0.5, 0.5, 0.5],
            &[out.clone(), embed.clone()],
            &device,
        )?;
        let bias = NamedTensor::from_vec(vec![0.1f32, -0.1], &[out.clone()], &device)?;
        let linear = Linear::new(vec![embed.clone()], vec![out.clone()], weight, Some(bias))?;
        let x = NamedTensor::from_vec(
            vec![1f32, 2., 3., 4., 5., 6.],
            &[pos.clone(), embed],
            &device,
        )?;
        let y = linear.forward(&x, &PrecisionPolicy::default())?;
        assert_eq!(y.axes(), &[pos.clone(), out.clone()]);
        let values = y.to_vec_f32(&[pos, out])?;
        let expected = [-2.0 + 0.1, 3.0 - 0.1, -2.0 + 0.1, 7.5 - 0.1];
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn contracts_multiple_input_axes() -> Result<()> {
        let device = Device::Cpu;
        let head = Axis::new("head", 2);
        let value = Axis::new("value_embedding", 2);
        let embed = Axis::new("embedding", 1);
        let pos = Axis::new("position", 1);
        let weight = NamedTensor::from_vec(
            vec![1f32, 2., 3., 4.],
            &[embed.clone(), head.clone(), value.clone()],
            &device,
        )?;
        let linear = Linear::new(vec![head.clone(), value.clone()], vec![embed.clone()], weight, None)?;
        let x = NamedTensor::ones(&[pos.clone(), head, value], DType::F32, &device)?;
        let y = linear.forward(&x, &PrecisionPolicy::default())?;
        assert_eq!(y.to_vec_f32(&[pos, embed])?, vec![10.0]);
        Ok(())
    }

    #[test]
    fn stacked_linear_matches_individual_layers() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed, out) = axes();
        let head = Axis::new("head", 3);
        let keys = PrngKey::new(11).split(3);
        let singles = keys
            .iter()
            .map(|&key| {
                Linear::init(
                    &[embed.clone()],
                    &[out.clone()],
                    true,
                    &LinearInit::default(),
                    key,
                    &device,
                    DType::F32,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let stacked = Linear::stack(&head, &singles)?;
        let x = PrngKey::new(5).normal_tensor(&[pos.clone(), embed.clone()], 1.0, &device)?;
        let policy = PrecisionPolicy::default();
        let all = stacked.forward(&x, &policy)?;
        assert_eq!(all.axes(), &[pos.clone(), head.clone(), out.clone()]);
        for (h, single) in singles.iter().enumerate() {
            let expected = single.forward(&x, &policy)?;
            assert!(all.index(&head, h)?.max_abs_diff(&expected)? < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn rejects_missing_or_clashing_axes() -> Result<()> {
        let device = Device::Cpu;
        let (pos, embed, out) = axes();
        let linear = Linear::init(
            &[embed.clone()],
            &[out.clone()],
            true,
            &LinearInit::default(),
            PrngKey::new(0),
            &device,
            DType::F32,
        )?;
        let policy = PrecisionPolicy::default();
        let wrong = NamedTensor::zeros(&[pos.clone(), Axis::new("embedding", 4)], DType::F32, &device)?;
        assert!(matches!(
            linear.forward(&wrong, &policy),
            Err(LayerError::AxisMismatch { .. })
        ));
        let clash = NamedTensor::zeros(&[out, embed], DType::F32, &device)?;
        assert!(matches!(
            linear.forward(&clash, &policy),
            Err(LayerError::DuplicateAxis { .. })
        ));
        Ok(())
    }

    #[test]
    fn init_is_reproducible_from_key() -> Result<()> {
        let device = Device::Cpu;
        let (_, embed, out) = axes();
        let build = |seed| {
            Linear::init(
                &[embed.clone()],
                &[out.clone()],
                true,
                &LinearInit::XavierNormal,
                PrngKey::new(seed),
                &device,
                DType::F32,
            )
        };
        let a = build(42)?;
        let b = build(42)?;
        let c = build(43)?;
        assert_eq!(a.weight().max_abs_diff(b.weight())?, 0.0);
        assert!(a.weight().max_abs_diff(c.weight())? > 0.0);
        assert_eq!(a.parameter_count(), 3 * 2 + 2);
        Ok(())
    }
}
