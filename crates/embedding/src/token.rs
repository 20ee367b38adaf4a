//! Lookup table with a tied transposed readout.

use candle_core::{DType, Device};
use layers::{checks, Axis, LayerError, NamedTensor, PrecisionPolicy, PrngKey};

use crate::errors::{EmbeddingError, Result};

/// Learnable table over `(rows × embed)`.
///
/// [`EmbeddingTable::embed`] gathers rows by integer id and
/// [`EmbeddingTable::unembed`] projects hidden states back onto every row with
/// the same weight, so there is no separate output matrix.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    rows: Axis,
    embed: Axis,
    weight: NamedTensor,
    policy: PrecisionPolicy,
}

impl EmbeddingTable {
    /// Samples every entry i.i.d. from `N(0, std^2)` using `key`.
    pub fn init(
        rows: &Axis,
        embed: &Axis,
        std: f64,
        key: PrngKey,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let weight = key
            .normal_tensor(&[rows.clone(), embed.clone()], std, device)?
            .to_dtype(dtype)?;
        Self::from_weight(weight, rows, embed)
    }

    /// Wraps an existing weight carrying exactly the `rows` and `embed` axes.
    pub fn from_weight(weight: NamedTensor, rows: &Axis, embed: &Axis) -> Result<Self> {
        if rows.same_name(embed) {
            return Err(LayerError::DuplicateAxis {
                axis: rows.name().to_string(),
                context: "embedding table",
            }
            .into());
        }
        if weight.axes().len() != 2 {
            return Err(LayerError::InvalidConfig(format!(
                "embedding weight must carry [{rows}, {embed}], got {:?}",
                weight.axes()
            ))
            .into());
        }
        let weight = weight.rearrange(&[rows.clone(), embed.clone()])?;
        checks::expect_dtype_in("embedding.weight", weight.tensor(), checks::FLOAT_DTYPES)?;
        let policy = PrecisionPolicy::from_parameter_dtype(weight.dtype());
        Ok(Self {
            rows: rows.clone(),
            embed: embed.clone(),
            weight,
            policy,
        })
    }

    pub fn rows(&self) -> &Axis {
        &self.rows
    }

    pub fn embed_axis(&self) -> &Axis {
        &self.embed
    }

    pub fn weight(&self) -> &NamedTensor {
        &self.weight
    }

    pub fn parameter_count(&self) -> usize {
        self.rows.size() * self.embed.size()
    }

    /// Gathers one row per id; the result carries the axes of `ids` followed
    /// by the embedding axis.
    pub fn embed(&self, ids: &NamedTensor) -> Result<NamedTensor> {
        if ids.has_axis(&self.embed) {
            return Err(LayerError::DuplicateAxis {
                axis: self.embed.name().to_string(),
                context: "embedding ids",
            }
            .into());
        }
        self.ensure_id_range(ids)?;
        Ok(self.gather(ids)?)
    }

    /// Scores `hidden` against every row: `hidden · weightᵀ` over the embed axis.
    pub fn unembed(&self, hidden: &NamedTensor) -> Result<NamedTensor> {
        hidden.axis_index(&self.embed, "unembed.input")?;
        if hidden.has_axis(&self.rows) {
            return Err(LayerError::DuplicateAxis {
                axis: self.rows.name().to_string(),
                context: "unembed.input already carries the vocabulary axis",
            }
            .into());
        }
        let input = self.policy.cast_for_matmul(hidden)?;
        let weight = self.policy.cast_for_matmul(&self.weight)?;
        let logits = input.dot(std::slice::from_ref(&self.embed), &weight)?;
        Ok(self.policy.cast_to_storage(&logits)?)
    }

    /// Unchecked gather for ids already known to be in range.
    pub(crate) fn gather(&self, ids: &NamedTensor) -> layers::Result<NamedTensor> {
        self.weight.take(&self.rows, ids)
    }

    fn ensure_id_range(&self, ids: &NamedTensor) -> Result<()> {
        if !ids.dtype().is_int() {
            return Err(LayerError::InvalidConfig(format!(
                "token ids expected integer dtype but received {:?}",
                ids.dtype()
            ))
            .into());
        }
        let flat = ids.tensor().flatten_all()?.to_dtype(DType::I64)?;
        if flat.elem_count() == 0 {
            return Ok(());
        }
        let vocab = self.rows.size();
        let min_id = flat.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(EmbeddingError::OutOfRangeId { id: min_id, vocab });
        }
        let max_id = flat.max_all()?.to_scalar::<i64>()?;
        if max_id >= vocab as i64 {
            return Err(EmbeddingError::OutOfRangeId { id: max_id, vocab });
        }
        Ok(())
    }
}
