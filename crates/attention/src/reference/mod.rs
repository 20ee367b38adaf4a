//! Portable, exact scaled dot-product attention.
//!
//! These paths favour clarity over absolute performance; the attention blocks
//! build on them directly.

pub mod exact;

pub use exact::{dot_product_attention, dot_product_attention_weights, MASK_FILL};
