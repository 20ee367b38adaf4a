//! Embedding crate
//!
//! Token lookup tables, the learned absolute position table, and the combined
//! [`Embedding`] that sums both and reads hidden states back out to vocabulary
//! logits through the same token table.

pub mod combined;
pub mod errors;
pub mod positional;
pub mod token;

pub use combined::{Embedding, EmbeddingConfig};
pub use errors::{EmbeddingError, Result};
pub use positional::LearnedPositions;
pub use token::EmbeddingTable;
