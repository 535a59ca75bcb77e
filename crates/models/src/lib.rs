//! Burn models for bird's-eye-view road-map prediction from six camera views.
//!
//! This crate defines the network architectures and the tensor transforms they share:
//! - `stitch`: reorder the six views and lay them side by side as one panorama.
//! - `autoencoder`: `Encoder`/`Decoder` pair plus the six-to-one masking task used for pretraining.
//! - `roadmap`: pretrained encoder + linear projection head predicting an occupancy grid.
//! - `baseline`: frozen ResNet-style feature extractor + linear head (legacy single-stage model).
//!
//! These are pure Burn modules; optimisation, scheduling and checkpoint handling live in
//! the `training` crate.

use thiserror::Error;

pub mod autoencoder;
pub mod baseline;
pub mod roadmap;
pub mod stitch;

pub use autoencoder::{
    mask_segments, six_to_one, Autoencoder, AutoencoderConfig, Decoder, Encoder, MaskedBatch,
};
pub use baseline::{FeatureExtractor, FeatureExtractorConfig, LegacyRoadMap, LegacyRoadMapConfig};
pub use roadmap::{EncoderStage, RoadMapModel, RoadMapModelConfig};
pub use stitch::{wide_stitch, VIEW_COUNT, VIEW_ORDER};

/// Shape violations detected before a tensor reaches a layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("expected {expected} camera views per sample, got {actual}")]
    ViewCount { expected: usize, actual: usize },
    #[error("wide image width {width} is not divisible into {segments} segments")]
    WidthNotDivisible { width: usize, segments: usize },
    #[error("got {actual} mask segments for a batch of {expected}")]
    SegmentCount { expected: usize, actual: usize },
    #[error("mask segment {index} out of range 0..{segments}")]
    SegmentIndex { index: usize, segments: usize },
}
