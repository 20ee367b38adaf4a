//! Error type for assembling and running the GPT model.

use attention::AttentionError;
use embedding::EmbeddingError;
use layers::LayerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Every violated constraint found by [`GptConfig::validate`](crate::GptConfig::validate).
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
    #[error("unsupported configuration format: {0}")]
    ConfigFormat(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
