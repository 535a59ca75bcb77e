//! Command-line arguments and the fully resolved run configurations built from them.
//!
//! Every knob gets its default at parse time; the `*TrainConfig` structs are what the
//! training loops consume, and they are written to `<run_dir>/config.json` for each run.

use clap::{ArgAction, Parser, ValueEnum};
use cli_support::{DataArgs, RunArgs};
use models::{AutoencoderConfig, FeatureExtractorConfig, LegacyRoadMapConfig, RoadMapModelConfig};
use serde::{Deserialize, Serialize};
use scene_dataset::{LABELED_SCENES, UNLABELED_SCENES};
use std::ops::Range;
use std::path::PathBuf;

use crate::util::BackendKind;

/// Seed used by the pretraining and road-map pipelines unless `--seed` is given.
pub const DEFAULT_SEED: u64 = 20200505;
/// Seed used by the legacy baseline unless `--seed` is given.
pub const BASELINE_SEED: u64 = 0;
/// Fraction of scenes assigned to training in the 80/20 split.
pub const TRAIN_FRACTION: f32 = 0.8;

/// Pixel-wise loss for the road-map regressor.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadMapLoss {
    /// Mean squared error between sigmoid outputs and the binary map.
    Mse,
    /// Binary cross-entropy on the flattened probabilities.
    Bce,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train_autoencoder",
    about = "Pretrain the encoder on the six-to-one masked view reconstruction task"
)]
pub struct AutoencoderArgs {
    /// Intermediate layer width before the latent embedding.
    #[arg(long, default_value_t = 256)]
    pub hidden_dim: usize,
    /// Dimension of the latent vector z.
    #[arg(long, default_value_t = 128)]
    pub latent_dim: usize,
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
    /// Wide (stitched) input width.
    #[arg(long, default_value_t = 306 * 6)]
    pub input_width: usize,
    #[arg(long, default_value_t = 256)]
    pub input_height: usize,
    /// Width of one camera view (the reconstruction target).
    #[arg(long, default_value_t = 306)]
    pub output_width: usize,
    #[arg(long, default_value_t = 256)]
    pub output_height: usize,
    #[arg(long, default_value_t = 3)]
    pub in_channels: usize,
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub run: RunArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoencoderTrainConfig {
    pub model: AutoencoderConfig,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub seed: u64,
    pub link: PathBuf,
    /// Scene ids this pipeline reads from `link`.
    pub scenes: Range<usize>,
    pub run_dir: PathBuf,
    pub output_img_freq: usize,
    pub train_fraction: f32,
}

impl AutoencoderTrainConfig {
    pub fn from_args(args: &AutoencoderArgs) -> Self {
        Self {
            model: AutoencoderConfig::new()
                .with_hidden_dim(args.hidden_dim)
                .with_latent_dim(args.latent_dim)
                .with_in_channels(args.in_channels)
                .with_input_height(args.input_height)
                .with_input_width(args.input_width)
                .with_output_height(args.output_height)
                .with_output_width(args.output_width),
            learning_rate: args.learning_rate,
            batch_size: args.batch_size.max(1),
            epochs: args.run.epochs,
            seed: args.run.seed.unwrap_or(DEFAULT_SEED),
            link: args.data.link.clone(),
            scenes: UNLABELED_SCENES,
            run_dir: args.run.resolve_run_dir("autoencoder"),
            output_img_freq: args.run.output_img_freq.max(1),
            train_fraction: TRAIN_FRACTION,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let m = &self.model;
        if m.input_width != models::VIEW_COUNT * m.output_width {
            anyhow::bail!(
                "input_width {} must be {} x output_width {}",
                m.input_width,
                models::VIEW_COUNT,
                m.output_width
            );
        }
        if m.input_height != m.output_height {
            anyhow::bail!(
                "input_height {} and output_height {} must match",
                m.input_height,
                m.output_height
            );
        }
        check_run(self.epochs, self.learning_rate)
    }
}

fn check_run(epochs: usize, learning_rate: f64) -> anyhow::Result<()> {
    if epochs == 0 {
        anyhow::bail!("--epochs must be at least 1, no checkpoint would be written");
    }
    if !(learning_rate > 0.0) {
        anyhow::bail!("learning_rate must be positive, got {learning_rate}");
    }
    Ok(())
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train_roadmap",
    about = "Train the road-map regressor on top of a pretrained autoencoder encoder"
)]
pub struct RoadMapArgs {
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
    /// Autoencoder checkpoint (`.bin` with its `.json` config alongside).
    #[arg(long)]
    pub pretrained_path: PathBuf,
    /// Epoch at which the encoder starts receiving gradients.
    #[arg(long, default_value_t = 30)]
    pub unfreeze_epoch: usize,
    /// Pixel-wise loss.
    #[arg(long, value_enum, default_value_t = RoadMapLoss::Mse)]
    pub loss: RoadMapLoss,
    /// Side length of the predicted occupancy grid.
    #[arg(long, default_value_t = 800)]
    pub map_size: usize,
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub run: RunArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoadMapTrainConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub pretrained_path: PathBuf,
    pub unfreeze_epoch: usize,
    pub loss: RoadMapLoss,
    pub map_size: usize,
    pub epochs: usize,
    pub seed: u64,
    pub link: PathBuf,
    /// Scene ids this pipeline reads from `link`.
    pub scenes: Range<usize>,
    pub run_dir: PathBuf,
    pub output_img_freq: usize,
    pub train_fraction: f32,
}

impl RoadMapTrainConfig {
    pub fn from_args(args: &RoadMapArgs) -> Self {
        Self {
            learning_rate: args.learning_rate,
            batch_size: args.batch_size.max(1),
            pretrained_path: args.pretrained_path.clone(),
            unfreeze_epoch: args.unfreeze_epoch,
            loss: args.loss,
            map_size: args.map_size,
            epochs: args.run.epochs,
            seed: args.run.seed.unwrap_or(DEFAULT_SEED),
            link: args.data.link.clone(),
            scenes: LABELED_SCENES,
            run_dir: args.run.resolve_run_dir("roadmap"),
            output_img_freq: args.run.output_img_freq.max(1),
            train_fraction: TRAIN_FRACTION,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        check_run(self.epochs, self.learning_rate)
    }

    /// Model configuration once the pretrained encoder's own configuration is known.
    pub fn model_config(&self, encoder: AutoencoderConfig) -> RoadMapModelConfig {
        RoadMapModelConfig::new(encoder).with_map_size(self.map_size)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train_baseline",
    about = "Train the legacy single-stage road-map baseline (frozen ResNet features + linear head)"
)]
pub struct BaselineArgs {
    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 800)]
    pub map_size: usize,
    /// Number of shuffled labeled scenes used for training; the rest validate.
    #[arg(long, default_value_t = 24)]
    pub train_scenes: usize,
    /// Run a single training and validation batch, then stop.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub fast_dev_run: bool,
    /// Optional pretrained feature-extractor record.
    #[arg(long)]
    pub extractor_weights: Option<PathBuf>,
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub run: RunArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineTrainConfig {
    pub model: LegacyRoadMapConfig,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub train_scenes: usize,
    pub fast_dev_run: bool,
    pub extractor_weights: Option<PathBuf>,
    pub epochs: usize,
    pub seed: u64,
    pub link: PathBuf,
    /// Scene ids this pipeline reads from `link`.
    pub scenes: Range<usize>,
    pub run_dir: PathBuf,
}

impl BaselineTrainConfig {
    pub fn from_args(args: &BaselineArgs) -> Self {
        Self {
            model: LegacyRoadMapConfig::new(FeatureExtractorConfig::new())
                .with_map_size(args.map_size),
            batch_size: args.batch_size.max(1),
            learning_rate: args.learning_rate,
            train_scenes: args.train_scenes,
            fast_dev_run: args.fast_dev_run,
            extractor_weights: args.extractor_weights.clone(),
            epochs: if args.fast_dev_run { 1 } else { args.run.epochs },
            seed: args.run.seed.unwrap_or(BASELINE_SEED),
            link: args.data.link.clone(),
            scenes: LABELED_SCENES,
            run_dir: args.run.resolve_run_dir("baseline"),
        }
    }
}
