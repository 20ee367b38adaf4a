//! Learned absolute position table.

use candle_core::{DType, Device};
use layers::{Axis, NamedTensor, PrngKey};

use crate::{
    errors::{EmbeddingError, Result},
    token::EmbeddingTable,
};

/// One learned vector per position index, up to a fixed maximum length.
#[derive(Debug, Clone)]
pub struct LearnedPositions {
    table: EmbeddingTable,
}

impl LearnedPositions {
    pub fn init(
        max_position: &Axis,
        embed: &Axis,
        std: f64,
        key: PrngKey,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        EmbeddingTable::init(max_position, embed, std, key, device, dtype).map(Self::from_table)
    }

    pub fn from_table(table: EmbeddingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    pub fn max_positions(&self) -> usize {
        self.table.rows().size()
    }

    /// Rows `0..pos.size()` of the table, tagged `[pos, embed]`.
    pub fn lookup(&self, pos: &Axis) -> Result<NamedTensor> {
        let max = self.max_positions();
        if pos.size() > max {
            return Err(EmbeddingError::SequenceLengthExceeded {
                length: pos.size(),
                max,
            });
        }
        let indices = NamedTensor::arange(pos, self.table.weight().device())?;
        Ok(self.table.gather(&indices)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_leading_rows() -> Result<()> {
        let device = Device::Cpu;
        let max = Axis::new("max_position", 4);
        let embed = Axis::new("embedding", 2);
        let weight = NamedTensor::from_vec(
            vec![0f32, 1., 10., 11., 20., 21., 30., 31.],
            &[max.clone(), embed.clone()],
            &device,
        )?;
        let positions = LearnedPositions::from_table(EmbeddingTable::from_weight(weight, &max, &embed)?);
        let pos = Axis::new("position", 3);
        let rows = positions.lookup(&pos)?;
        assert_eq!(rows.axes(), &[pos.clone(), embed.clone()]);
        assert_eq!(rows.to_vec_f32(&[pos, embed])?, vec![0., 1., 10., 11., 20., 21.]);
        Ok(())
    }

    #[test]
    fn rejects_sequences_longer_than_table() -> Result<()> {
        let device = Device::Cpu;
        let positions = LearnedPositions::init(
            &Axis::new("max_position", 4),
            &Axis::new("embedding", 2),
            0.02,
            PrngKey::new(0),
            &device,
            DType::F32,
        )?;
        assert!(positions.lookup(&Axis::new("position", 4)).is_ok());
        let err = positions.lookup(&Axis::new("position", 5)).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::SequenceLengthExceeded { length: 5, max: 4 }
        ));
        Ok(())
    }
}
