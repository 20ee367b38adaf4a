//! Building blocks for transformer layers.
//!
//! Every tensor that crosses a component boundary is a [`NamedTensor`]: a
//! Candle tensor whose dimensions are tagged with [`Axis`] values and
//! addressed by name. Linear projections, normalisation, activations and the
//! position-wise MLP are expressed over those axes so that a mis-wired
//! component fails with [`LayerError::AxisMismatch`] instead of silently
//! transposing data.

pub mod activations;
pub mod axis;
pub mod checks;
pub mod dtypes;
pub mod linear;
pub mod mlp;
pub mod named;
pub mod norm;
pub mod prng;
pub mod residual;
pub mod sequential;

use thiserror::Error;

pub use activations::{ActivationKind, Activation};
pub use axis::Axis;
pub use dtypes::{Precision, PrecisionPolicy};
pub use linear::{Linear, LinearInit};
pub use mlp::{FeedForwardConfig, Mlp};
pub use named::NamedTensor;
pub use norm::LayerNorm;
pub use prng::PrngKey;
pub use residual::prenorm_residual;
pub use sequential::{sequential, Sequential};

/// Errors raised while wiring or evaluating layer components.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A same-named axis was seen with two different sizes.
    #[error("axis `{axis}` mismatch in {context}: expected size {expected}, got {actual}")]
    AxisMismatch {
        axis: String,
        expected: usize,
        actual: usize,
        context: &'static str,
    },
    /// An operation required an axis the tensor does not carry.
    #[error("{context} requires axis `{axis}` but tensor has {available:?}")]
    MissingAxis {
        axis: String,
        available: Vec<String>,
        context: &'static str,
    },
    /// Two dimensions of one tensor were tagged with the same axis name.
    #[error("axis `{axis}` appears more than once in {context}")]
    DuplicateAxis { axis: String, context: &'static str },
    /// Constructor arguments that cannot describe a valid layer.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Result alias used throughout the layers crate.
pub type Result<T> = std::result::Result<T, LayerError>;
