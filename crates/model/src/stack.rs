//! Ordered stack of transformer layers.

use candle_core::Device;
use layers::{axis::names, Axis, NamedTensor, PrngKey};
use log::trace;

use crate::{
    block::TransformerLayer,
    config::GptConfig,
    error::{ModelError, Result},
};

/// `num_layers` transformer layers applied as a left fold: layer 0 reads the
/// embeddings, layer `i + 1` reads the output of layer `i`.
#[derive(Debug, Clone)]
pub struct TransformerStack {
    layers: Vec<TransformerLayer>,
    layer_axis: Axis,
}

impl TransformerStack {
    /// Splits `key` into one key per layer, in layer order.
    pub fn init(config: &GptConfig, key: PrngKey, device: &Device) -> Result<Self> {
        let layers = key
            .split(config.num_layers)
            .into_iter()
            .map(|layer_key| TransformerLayer::init(config, layer_key, device))
            .collect::<Result<Vec<_>>>()?;
        Self::from_layers(layers)
    }

    /// Wraps already-built layers, keeping their order.
    pub fn from_layers(layers: Vec<TransformerLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(ModelError::InvalidConfig(vec![
                "transformer stack requires at least one layer".into(),
            ]));
        }
        let layer_axis = Axis::new(names::LAYER, layers.len());
        Ok(Self { layers, layer_axis })
    }

    pub fn layers(&self) -> &[TransformerLayer] {
        &self.layers
    }

    pub fn layer_axis(&self) -> &Axis {
        &self.layer_axis
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(TransformerLayer::parameter_count).sum()
    }

    pub fn forward(&self, pos: &Axis, embeddings: &NamedTensor, mask: &NamedTensor) -> Result<NamedTensor> {
        self.layers
            .iter()
            .enumerate()
            .try_fold(embeddings.clone(), |hidden, (index, layer)| {
                trace!("transformer layer {index}/{}", self.layer_axis.size());
                layer.forward(pos, &hidden, mask)
            })
    }
}
