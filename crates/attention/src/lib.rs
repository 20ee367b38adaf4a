//! Causal self-attention over named axes.
//!
//! Inputs are [`NamedTensor`](layers::NamedTensor)s carrying a caller-chosen
//! position axis and the `embedding` axis. Each attention call renames the
//! position axis into `query_position` and `key_value_position` copies,
//! combines a lower-triangular causal mask with the caller's 1-D validity
//! mask, and computes scaled dot-product attention with masked logits filled
//! by [`MASK_FILL`](reference::MASK_FILL). Logits, masking and the softmax
//! always run in the reduction dtype of the component's precision policy.
//!
//! Multi-head attention stores its per-head projections stacked along a
//! `head` axis, so every head is evaluated in the same contraction. Any extra
//! axis on the inputs (a `batch` axis, for example) passes through untouched.

pub mod core;
pub mod masks;
pub mod multi_head;
pub mod reference;
pub mod self_attention;

pub use crate::core::{Attention, AttentionConfig, AttentionError, Result};
pub use multi_head::MultiHeadAttention;
pub use reference::{dot_product_attention, dot_product_attention_weights, MASK_FILL};
pub use self_attention::SelfAttention;
