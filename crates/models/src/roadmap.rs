//! Road-map regressor: pretrained encoder followed by a linear projection head.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fmt;

use crate::autoencoder::{AutoencoderConfig, Encoder};
use crate::stitch::wide_stitch;
use crate::ShapeError;

/// Whether the pretrained encoder receives gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStage {
    /// Encoder output is detached; only the projection head learns.
    Frozen,
    /// Encoder and head are fine-tuned together.
    Unfrozen,
}

impl EncoderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderStage::Frozen => "frozen",
            EncoderStage::Unfrozen => "unfrozen",
        }
    }
}

impl fmt::Display for EncoderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Config, Debug)]
pub struct RoadMapModelConfig {
    pub encoder: AutoencoderConfig,
    /// Side length of the square occupancy grid.
    #[config(default = 800)]
    pub map_size: usize,
}

impl RoadMapModelConfig {
    /// Fresh encoder plus head; used when no pretrained encoder is available (tests, records).
    pub fn init<B: Backend>(&self, device: &B::Device) -> RoadMapModel<B> {
        RoadMapModel::from_encoder(self.encoder.init_encoder(device), self.map_size, device)
    }
}

#[derive(Module, Debug)]
pub struct RoadMapModel<B: Backend> {
    pub encoder: Encoder<B>,
    head: Linear<B>,
    map_size: usize,
}

impl<B: Backend> RoadMapModel<B> {
    /// Attach a projection head to an (already trained) encoder.
    pub fn from_encoder(encoder: Encoder<B>, map_size: usize, device: &B::Device) -> Self {
        let head = LinearConfig::new(encoder.latent_dim(), map_size * map_size).init(device);
        Self {
            encoder,
            head,
            map_size,
        }
    }

    pub fn map_size(&self) -> usize {
        self.map_size
    }

    /// `[batch, 6, c, h, w]` views -> `[batch, map_size, map_size]` road probabilities.
    pub fn forward(&self, views: Tensor<B, 5>) -> Result<Tensor<B, 3>, ShapeError> {
        self.forward_staged(views, EncoderStage::Unfrozen)
    }

    pub fn forward_staged(
        &self,
        views: Tensor<B, 5>,
        stage: EncoderStage,
    ) -> Result<Tensor<B, 3>, ShapeError> {
        Ok(self.forward_wide(wide_stitch(views)?, stage))
    }

    /// Same as `forward_staged` for an input that is already wide-stitched.
    pub fn forward_wide(&self, wide: Tensor<B, 4>, stage: EncoderStage) -> Tensor<B, 3> {
        let batch = wide.dims()[0];
        let latent = self.encoder.forward(wide);
        let latent = match stage {
            EncoderStage::Frozen => latent.detach(),
            EncoderStage::Unfrozen => latent,
        };
        sigmoid(self.head.forward(latent)).reshape([batch, self.map_size, self.map_size])
    }
}
