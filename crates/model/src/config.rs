use std::{fs, path::Path};

use attention::AttentionConfig;
use candle_core::DType;
use embedding::EmbeddingConfig;
use layers::{
    axis::names, ActivationKind, Axis, FeedForwardConfig, LinearInit, Precision,
};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Hyperparameters of the decoder-only GPT model.
///
/// Every field has a default, so configuration files only need to name the
/// values they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GptConfig {
    pub vocab_size: usize,
    /// Width of the residual stream.
    pub embedding_size: usize,
    /// Per-head query/key width.
    pub query_key_embedding_size: usize,
    /// Per-head value width.
    pub value_embedding_size: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    /// Standard deviation of the token and position tables at initialisation.
    pub initializer_range: f64,
    pub layer_norm_eps: f64,
    /// Hidden width of the MLP.
    pub intermediate_size: usize,
    /// Size of the position table; the longest sequence a forward call accepts.
    pub max_sequence_length: usize,
    /// Standard deviation of every linear weight at initialisation.
    pub linear_init_std: f64,
    /// Parameter storage dtype.
    pub precision: Precision,
    /// Non-linearity between the two MLP projections.
    pub mlp_activation: ActivationKind,
}

impl Default for GptConfig {
    fn default() -> Self {
        Self {
            vocab_size: 50257,
            embedding_size: 384,
            query_key_embedding_size: 64,
            value_embedding_size: 64,
            num_heads: 6,
            num_layers: 6,
            initializer_range: 0.02,
            layer_norm_eps: 1e-5,
            intermediate_size: 1536,
            max_sequence_length: 1024,
            linear_init_std: 0.02,
            precision: Precision::F32,
            mlp_activation: ActivationKind::Gelu,
        }
    }
}

impl GptConfig {
    /// Loads a configuration from `.json` or `.toml` and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: GptConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(ModelError::ConfigFormat(format!(
                    "unsupported configuration extension '{other}'"
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("embedding_size", self.embedding_size),
            ("query_key_embedding_size", self.query_key_embedding_size),
            ("value_embedding_size", self.value_embedding_size),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("intermediate_size", self.intermediate_size),
            ("max_sequence_length", self.max_sequence_length),
        ];
        for (name, value) in sizes {
            if value == 0 {
                errors.push(format!("{name} must be greater than zero"));
            }
        }
        let scales = [
            ("initializer_range", self.initializer_range),
            ("layer_norm_eps", self.layer_norm_eps),
            ("linear_init_std", self.linear_init_std),
        ];
        for (name, value) in scales {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("{name} must be a positive finite number, got {value}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModelError::InvalidConfig(errors))
        }
    }

    pub fn dtype(&self) -> DType {
        self.precision.dtype()
    }

    pub fn embed_axis(&self) -> Axis {
        Axis::new(names::EMBED, self.embedding_size)
    }

    pub fn vocab_axis(&self) -> Axis {
        Axis::new(names::VOCAB, self.vocab_size)
    }

    pub fn linear_init(&self) -> LinearInit {
        LinearInit::Normal {
            std: self.linear_init_std,
        }
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            vocab_size: self.vocab_size,
            embedding_size: self.embedding_size,
            max_sequence_length: self.max_sequence_length,
            initializer_range: self.initializer_range,
        }
    }

    pub fn attention_config(&self) -> AttentionConfig {
        AttentionConfig {
            embedding_size: self.embedding_size,
            query_key_size: self.query_key_embedding_size,
            value_size: self.value_embedding_size,
            num_heads: self.num_heads,
            init: self.linear_init(),
        }
    }

    pub fn feed_forward_config(&self) -> FeedForwardConfig {
        FeedForwardConfig {
            embedding_size: self.embedding_size,
            intermediate_size: self.intermediate_size,
            activation: self.mlp_activation,
            init: self.linear_init(),
        }
    }
}
