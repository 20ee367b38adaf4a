//! Activation catalogue for transformer feed-forward stacks.
//!
//! Activations are elementwise: they accept a [`NamedTensor`] with any axes
//! and return one with identical axes. Each implementation promotes inputs to
//! the compute dtype requested by [`PrecisionPolicy`] before evaluating the
//! non-linearity, then casts the result back to the storage dtype.
//!
//! # Built-in formulas
//!
//! * **GELU** uses the tanh approximation
//!   `0.5 * x * (1 + tanh(sqrt(2 / pi) * (x + 0.044715 * x^3)))`, the variant
//!   GPT models are trained with.
//! * **GELU (erf)** evaluates `0.5 * x * (1 + erf(x / sqrt(2)))` exactly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{dtypes::PrecisionPolicy, named::NamedTensor, Result};

/// Identifies which non-linearity is implemented by an [`Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    /// Identity function, useful for debugging or wiring custom stacks.
    Identity,
    /// GeLU with the tanh approximation used by GPT style models.
    #[default]
    Gelu,
    /// GeLU evaluated through the error function.
    GeluErf,
    Relu,
}

/// Common interface shared by activation functions.
pub trait Activation: Send + Sync {
    fn kind(&self) -> ActivationKind;

    /// Applies the activation to `input` using the precision rules in `policy`.
    fn forward(&self, input: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor>;
}

/// Built-in activation backed by Candle kernels.
struct BuiltinActivation {
    kind: ActivationKind,
}

impl Activation for BuiltinActivation {
    fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn forward(&self, input: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor> {
        if self.kind == ActivationKind::Identity {
            return policy.cast_to_storage(input);
        }
        let compute = policy.cast_for_matmul(input)?;
        let activated = match self.kind {
            ActivationKind::Gelu => compute.map(|t| t.gelu())?,
            ActivationKind::GeluErf => compute.map(|t| t.gelu_erf())?,
            ActivationKind::Relu => compute.map(|t| t.relu())?,
            ActivationKind::Identity => compute,
        };
        policy.cast_to_storage(&activated)
    }
}

/// Returns a shared built-in activation implementation.
pub fn builtin(kind: ActivationKind) -> Arc<dyn Activation> {
    Arc::new(BuiltinActivation { kind })
}

/// Tanh-approximated GELU, the activation used by the MLP and LM head.
pub fn gelu(input: &NamedTensor, policy: &PrecisionPolicy) -> Result<NamedTensor> {
    builtin(ActivationKind::Gelu).forward(input, policy)
}
