//! Decoder-only GPT forward graph.
//!
//! [`Gpt`] composes the [`embedding`] crate's token and position tables, a
//! [`TransformerStack`] of pre-norm [`TransformerLayer`]s built on the
//! [`attention`] crate, and an [`LMTransform`] head, then reads logits out
//! through the tied token table. Parameters are initialised deterministically
//! from a [`PrngKey`](layers::PrngKey) and configured by [`GptConfig`].

pub mod block;
pub mod config;
pub mod error;
pub mod lm_transform;
pub mod model;
pub mod stack;

pub use block::TransformerLayer;
pub use config::GptConfig;
pub use error::{ModelError, Result};
pub use lm_transform::{DuplicateAxisLinear, LMTransform};
pub use model::Gpt;
pub use stack::TransformerStack;
