//! Error types emitted by attention implementations.

use layers::LayerError;
use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The supplied tensors or sizes do not align with the documented contract.
    #[error("invalid tensor shape for {context}")]
    InvalidShape { context: String },
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, AttentionError>;
