//! Absolute position embeddings.

pub mod learned;

pub use learned::LearnedPositions;
