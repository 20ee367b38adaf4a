//! Core traits and types shared across attention implementations.

pub mod config;
pub mod errors;

use layers::{Axis, NamedTensor};

pub use config::AttentionConfig;
pub use errors::{AttentionError, Result};

/// Unified interface for causal attention blocks.
///
/// * `embeddings` carries `pos` and the embedding axis, plus any batch axes.
/// * `mask` carries `pos` (and optionally the same batch axes); non-zero
///   entries mark real tokens, zero entries mark padding.
/// * The returned tensor keeps `pos` and every batch axis.
pub trait Attention {
    fn attend(&self, pos: &Axis, embeddings: &NamedTensor, mask: &NamedTensor)
        -> Result<NamedTensor>;
}
