//! Top-level GPT composition.

use candle_core::Device;
use embedding::Embedding;
use layers::{axis::names, Axis, NamedTensor, PrngKey, Sequential};
use log::{debug, trace};

use crate::{
    config::GptConfig,
    error::{ModelError, Result},
    lm_transform::LMTransform,
    stack::TransformerStack,
};

/// Decoder-only transformer: embed, run the layer stack, transform, and read
/// out vocabulary logits through the tied token table.
#[derive(Debug, Clone)]
pub struct Gpt {
    config: GptConfig,
    embedding: Embedding,
    transformer: TransformerStack,
    lm_transform: LMTransform,
}

impl Gpt {
    /// Builds every parameter from `key` split as
    /// `[embedding, transformer, lm_transform]`.
    pub fn init(config: &GptConfig, key: PrngKey, device: &Device) -> Result<Self> {
        config.validate()?;
        let [embedding_key, transformer_key, lm_transform_key] = key.split_array();

        let embedding = Embedding::init(&config.embedding_config(), embedding_key, device, config.dtype())?;
        let transformer = TransformerStack::init(config, transformer_key, device)?;
        let lm_transform = LMTransform::init(config, lm_transform_key, device)?;

        let model = Self {
            config: config.clone(),
            embedding,
            transformer,
            lm_transform,
        };
        debug!(
            "gpt initialised: layers={} heads={} embed={} vocab={} max_seq={} precision={:?} parameters={}",
            config.num_layers,
            config.num_heads,
            config.embedding_size,
            config.vocab_size,
            config.max_sequence_length,
            config.precision,
            model.parameter_count()
        );
        Ok(model)
    }

    pub fn config(&self) -> &GptConfig {
        &self.config
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn transformer(&self) -> &TransformerStack {
        &self.transformer
    }

    pub fn lm_transform(&self) -> &LMTransform {
        &self.lm_transform
    }

    pub fn parameter_count(&self) -> usize {
        self.embedding.parameter_count()
            + self.transformer.parameter_count()
            + self.lm_transform.parameter_count()
    }

    /// Position axis of length `len` for a forward call.
    pub fn position_axis(len: usize) -> Axis {
        Axis::new(names::POSITION, len)
    }

    /// Unnormalised logits over `(pos × vocab)` for `token_ids`.
    ///
    /// `token_ids` and `mask` both carry `pos`; `mask` marks real tokens with
    /// non-zero entries. Any further axis on `token_ids` (a batch axis, for
    /// example) is carried through to the logits.
    pub fn forward(&self, pos: &Axis, token_ids: &NamedTensor, mask: &NamedTensor) -> Result<NamedTensor> {
        trace!("gpt forward pos={pos} ids={:?}", token_ids.axes());
        Sequential::<NamedTensor, ModelError>::new()
            .then(|ids| Ok(self.embedding.embed(pos, &ids)?))
            .then(|x| self.transformer.forward(pos, &x, mask))
            .then(|x| self.lm_transform.forward(&x))
            .then(|x| Ok(self.embedding.unembed(&x)?))
            .run(token_ids.clone())
    }
}
