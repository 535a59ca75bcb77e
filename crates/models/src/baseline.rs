//! Legacy single-stage model: frozen ResNet-style feature extractor + linear road-map head.

use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;

use crate::stitch::wide_stitch;
use crate::ShapeError;

/// Channel widths of the four residual stages (ResNet-18 layout, two blocks each).
const STAGES: [usize; 4] = [64, 128, 256, 512];

#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    #[config(default = 3)]
    pub in_channels: usize,
}

impl FeatureExtractorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let mut stages = Vec::with_capacity(STAGES.len());
        let mut in_planes = STAGES[0];
        for (i, &planes) in STAGES.iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            stages.push(ResidualBlock::new(in_planes, planes, stride, device));
            stages.push(ResidualBlock::new(planes, planes, 1, device));
            in_planes = planes;
        }
        FeatureExtractor {
            stem: Conv2dConfig::new([self.in_channels, STAGES[0]], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            stem_bn: BatchNormConfig::new(STAGES[0]).init(device),
            stem_pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks: stages,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }
}

/// Image classifier backbone with the classification layer removed.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    blocks: Vec<ResidualBlock<B>>,
    pool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> FeatureExtractor<B> {
    pub const OUTPUT_DIM: usize = STAGES[3];

    /// `[batch, channels, height, width]` -> `[batch, 512]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.stem_bn.forward(self.stem.forward(x)));
        let mut x = self.stem_pool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.pool.forward(x).flatten(1, 3)
    }
}

#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Shortcut<B>>,
    activation: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(in_planes: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let conv3 = |input: usize, stride: usize| {
            Conv2dConfig::new([input, planes], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };
        let shortcut = (stride != 1 || in_planes != planes).then(|| Shortcut {
            conv: Conv2dConfig::new([in_planes, planes], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(planes).init(device),
        });
        Self {
            conv1: conv3(in_planes, stride),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv3(planes, 1),
            bn2: BatchNormConfig::new(planes).init(device),
            shortcut,
            activation: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.bn.forward(shortcut.conv.forward(x.clone())),
            None => x.clone(),
        };
        let x = self.activation.forward(self.bn1.forward(self.conv1.forward(x)));
        let x = self.bn2.forward(self.conv2.forward(x));
        self.activation.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

#[derive(Config, Debug)]
pub struct LegacyRoadMapConfig {
    pub extractor: FeatureExtractorConfig,
    #[config(default = 800)]
    pub map_size: usize,
}

impl LegacyRoadMapConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LegacyRoadMap<B> {
        LegacyRoadMap {
            extractor: self.extractor.init(device),
            head: LinearConfig::new(
                FeatureExtractor::<B>::OUTPUT_DIM,
                self.map_size * self.map_size,
            )
            .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct LegacyRoadMap<B: Backend> {
    pub extractor: FeatureExtractor<B>,
    head: Linear<B>,
}

impl<B: Backend> LegacyRoadMap<B> {
    /// `[batch, 6, c, h, w]` views -> flattened road probabilities `[batch, map_size²]`.
    pub fn forward(&self, views: Tensor<B, 5>) -> Result<Tensor<B, 2>, ShapeError> {
        let features = self.extractor.forward(wide_stitch(views)?);
        Ok(sigmoid(self.head.forward(features)))
    }
}

impl<B: AutodiffBackend> LegacyRoadMap<B> {
    /// Training forward: the extractor runs on the inner backend, so it neither receives
    /// gradients nor updates its batch-norm statistics.
    pub fn forward_frozen(&self, views: Tensor<B, 5>) -> Result<Tensor<B, 2>, ShapeError> {
        let wide = wide_stitch(views)?;
        let features = self.extractor.valid().forward(wide.inner());
        Ok(sigmoid(self.head.forward(Tensor::from_inner(features))))
    }
}
