//! Error type shared by the embedding components.

use layers::LayerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The requested position axis is longer than the position table.
    #[error("sequence length {length} exceeds max_sequence_length {max}")]
    SequenceLengthExceeded { length: usize, max: usize },
    /// A lookup id falls outside `[0, rows)`.
    #[error("token id {id} is outside the vocabulary of size {vocab}")]
    OutOfRangeId { id: i64, vocab: usize },
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
