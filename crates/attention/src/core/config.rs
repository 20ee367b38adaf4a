//! Sizes and initialisation shared by the attention blocks.

use layers::{axis::names, Axis, LinearInit};

use super::errors::{AttentionError, Result};

/// Configuration driving attention construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionConfig {
    /// Width of the residual stream read by the projections.
    pub embedding_size: usize,
    /// Per-head query/key width.
    pub query_key_size: usize,
    /// Per-head value width.
    pub value_size: usize,
    pub num_heads: usize,
    /// Weight initialisation for every projection.
    pub init: LinearInit,
}

impl AttentionConfig {
    pub fn new(embedding_size: usize, query_key_size: usize, value_size: usize, num_heads: usize) -> Self {
        Self {
            embedding_size,
            query_key_size,
            value_size,
            num_heads,
            init: LinearInit::default(),
        }
    }

    pub fn embed_axis(&self) -> Axis {
        Axis::new(names::EMBED, self.embedding_size)
    }

    pub fn query_key_axis(&self) -> Axis {
        Axis::new(names::QK_EMBED, self.query_key_size)
    }

    pub fn value_axis(&self) -> Axis {
        Axis::new(names::V_EMBED, self.value_size)
    }

    pub fn head_axis(&self) -> Axis {
        Axis::new(names::HEAD, self.num_heads)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("embedding_size", self.embedding_size),
            ("query_key_size", self.query_key_size),
            ("value_size", self.value_size),
            ("num_heads", self.num_heads),
        ];
        match sizes.iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(AttentionError::InvalidShape {
                context: format!("attention {name} must be greater than zero"),
            }),
            None => Ok(()),
        }
    }
}
