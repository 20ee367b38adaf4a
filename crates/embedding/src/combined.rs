//! Token plus learned position embedding with a tied vocabulary readout.

use candle_core::{DType, Device};
use layers::{
    axis::names, Axis, LayerError, NamedTensor, PrngKey,
};
use log::debug;

use crate::{
    errors::Result,
    positional::LearnedPositions,
    token::EmbeddingTable,
};

/// Sizes needed to build an [`Embedding`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub vocab_size: usize,
    pub embedding_size: usize,
    pub max_sequence_length: usize,
    /// Standard deviation of both tables at initialisation.
    pub initializer_range: f64,
}

impl EmbeddingConfig {
    pub fn vocab_axis(&self) -> Axis {
        Axis::new(names::VOCAB, self.vocab_size)
    }

    pub fn embed_axis(&self) -> Axis {
        Axis::new(names::EMBED, self.embedding_size)
    }

    pub fn max_position_axis(&self) -> Axis {
        Axis::new(names::MAX_POSITION, self.max_sequence_length)
    }

    fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 || self.embedding_size == 0 || self.max_sequence_length == 0 {
            return Err(LayerError::InvalidConfig(format!(
                "embedding sizes must be greater than zero: {self:?}"
            ))
            .into());
        }
        if !(self.initializer_range.is_finite() && self.initializer_range > 0.0) {
            return Err(LayerError::InvalidConfig(format!(
                "initializer_range must be positive, got {}",
                self.initializer_range
            ))
            .into());
        }
        Ok(())
    }
}

/// Sum of a token lookup and a learned position lookup.
///
/// `embed` returns `token[ids[p]] + position[p]` for every `p` along the
/// caller's position axis; `unembed` reuses the token table transposed.
#[derive(Debug, Clone)]
pub struct Embedding {
    token: EmbeddingTable,
    position: LearnedPositions,
}

impl Embedding {
    /// Initialises both tables from `key` split as `[token, position]`.
    pub fn init(config: &EmbeddingConfig, key: PrngKey, device: &Device, dtype: DType) -> Result<Self> {
        config.validate()?;
        let [token_key, position_key] = key.split_array();
        let embed = config.embed_axis();
        let token = EmbeddingTable::init(
            &config.vocab_axis(),
            &embed,
            config.initializer_range,
            token_key,
            device,
            dtype,
        )?;
        let position = LearnedPositions::init(
            &config.max_position_axis(),
            &embed,
            config.initializer_range,
            position_key,
            device,
            dtype,
        )?;
        debug!(
            "embedding initialised: vocab={} embed={} max_position={} std={}",
            config.vocab_size, config.embedding_size, config.max_sequence_length, config.initializer_range
        );
        Self::from_parts(token, position)
    }

    /// Assembles an embedding from existing tables, which must share their
    /// embedding axis.
    pub fn from_parts(token: EmbeddingTable, position: LearnedPositions) -> Result<Self> {
        let token_embed = token.embed_axis();
        let position_embed = position.table().embed_axis();
        if token_embed != position_embed {
            return Err(LayerError::AxisMismatch {
                axis: token_embed.name().to_string(),
                expected: token_embed.size(),
                actual: position_embed.size(),
                context: "embedding.position_table",
            }
            .into());
        }
        Ok(Self { token, position })
    }

    pub fn token_table(&self) -> &EmbeddingTable {
        &self.token
    }

    pub fn position_table(&self) -> &LearnedPositions {
        &self.position
    }

    pub fn vocab_axis(&self) -> &Axis {
        self.token.rows()
    }

    pub fn embed_axis(&self) -> &Axis {
        self.token.embed_axis()
    }

    pub fn max_sequence_length(&self) -> usize {
        self.position.max_positions()
    }

    pub fn parameter_count(&self) -> usize {
        self.token.parameter_count() + self.position.table().parameter_count()
    }

    /// Embeds `ids`, an integer tensor carrying `pos` (plus any caller batch
    /// axes). The result carries the axes of `ids` followed by the embed axis.
    pub fn embed(&self, pos: &Axis, ids: &NamedTensor) -> Result<NamedTensor> {
        ids.axis_index(pos, "embedding.input_ids")?;
        let positions = self.position.lookup(pos)?;
        let tokens = self.token.embed(ids)?;
        Ok(tokens.add(&positions)?)
    }

    /// Vocabulary logits for `hidden` through the transposed token table.
    pub fn unembed(&self, hidden: &NamedTensor) -> Result<NamedTensor> {
        self.token.unembed(hidden)
    }
}
