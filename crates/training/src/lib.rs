#![recursion_limit = "256"]
//! Training loops for the six-camera road-map models.
//!
//! - `autoencoder`: six-to-one masked view reconstruction on unlabeled scenes.
//! - `roadmap`: occupancy-grid regression with a frozen-then-unfrozen pretrained encoder.
//! - `baseline`: frozen ResNet-style features with a trainable linear head.
//!
//! Checkpoints, run configs, metrics and image grids are written under a per-run directory.

pub mod autoencoder;
pub mod baseline;
pub mod checkpoint;
pub mod config;
pub mod logger;
pub mod metrics;
pub mod roadmap;
pub mod schedule;
pub mod search;
pub mod util;

pub use checkpoint::BestCheckpoint;
pub use config::{
    AutoencoderArgs, AutoencoderTrainConfig, BaselineArgs, BaselineTrainConfig, RoadMapArgs,
    RoadMapLoss, RoadMapTrainConfig,
};
pub use logger::{ExperimentLogger, JsonlLogger, MemoryLogger};
pub use models::{
    Autoencoder, AutoencoderConfig, EncoderStage, LegacyRoadMap, LegacyRoadMapConfig,
    RoadMapModel, RoadMapModelConfig,
};
pub use schedule::FreezeSchedule;
pub use util::{validate_backend_choice, BackendKind};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Autodiff wrapper used by every training loop.
pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
