use clap::Args;
use std::path::{Path, PathBuf};

/// Dataset location shared by every training binary.
#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    /// Dataset root containing scene_<S>/sample_<I> directories.
    #[arg(long, default_value = "/scratch/ab8690/DLSP20Dataset/data")]
    pub link: PathBuf,
}

/// Run bookkeeping shared across training binaries: epochs, seed, outputs.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Number of epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,
    /// Global seed for scene splits, shuffling, masking and parameter init
    /// (defaults per pipeline when omitted).
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output directory for metrics, image grids and checkpoints
    /// (defaults to "runs/<pipeline>").
    #[arg(long)]
    pub run_dir: Option<PathBuf>,
    /// Log image grids every N batches.
    #[arg(long, default_value_t = 500)]
    pub output_img_freq: usize,
}

impl RunArgs {
    /// Resolve the run directory, defaulting to "runs/<pipeline>".
    pub fn resolve_run_dir(&self, pipeline: &str) -> PathBuf {
        self.run_dir
            .clone()
            .unwrap_or_else(|| Path::new("runs").join(pipeline))
    }
}

/// Initialise `env_logger`; honours RUST_LOG and defaults to `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
