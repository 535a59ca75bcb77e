//! Checkpoint files: a Burn `.bin` record plus the model config as a `.json` sidecar.
//!
//! A run keeps two records under `<run_dir>/checkpoints/`: `best.bin` (lowest validation
//! loss so far) and `last.bin` (end of the latest epoch).

use anyhow::Context;
use burn::config::Config;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{
    Autoencoder, AutoencoderConfig, Encoder, LegacyRoadMap, LegacyRoadMapConfig, RoadMapModel,
    RoadMapModelConfig,
};
use std::fs;
use std::path::{Path, PathBuf};

type Recorder = BinFileRecorder<FullPrecisionSettings>;

pub fn checkpoint_dir(run_dir: &Path) -> PathBuf {
    run_dir.join("checkpoints")
}

/// `.json` file stored next to a `.bin` record.
pub fn config_sidecar(record: &Path) -> PathBuf {
    record.with_extension("json")
}

fn save_record<B: Backend, M: Module<B>, C: Config>(
    model: M,
    config: &C,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    model
        .save_file(path, &Recorder::new())
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;
    let sidecar = config_sidecar(path);
    config
        .save(&sidecar)
        .with_context(|| format!("writing {}", sidecar.display()))
}

fn load_config<C: Config>(record: &Path) -> anyhow::Result<C> {
    let sidecar = config_sidecar(record);
    C::load(&sidecar).map_err(|e| anyhow::anyhow!("reading {}: {e:?}", sidecar.display()))
}

pub fn save_autoencoder<B: Backend>(
    model: &Autoencoder<B>,
    config: &AutoencoderConfig,
    path: &Path,
) -> anyhow::Result<()> {
    save_record::<B, _, _>(model.clone(), config, path)
}

pub fn load_autoencoder<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<(AutoencoderConfig, Autoencoder<B>)> {
    let config: AutoencoderConfig = load_config(path)?;
    let model = config
        .init::<B>(device)
        .load_file(path, &Recorder::new(), device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
    Ok((config, model))
}

/// Load an autoencoder checkpoint and keep only its encoder.
pub fn load_pretrained_encoder<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<(AutoencoderConfig, Encoder<B>)> {
    let (config, model) = load_autoencoder::<B>(path, device)?;
    log::info!(
        "loaded pretrained encoder from {} (latent_dim={})",
        path.display(),
        config.latent_dim
    );
    Ok((config, model.encoder))
}

pub fn save_roadmap<B: Backend>(
    model: &RoadMapModel<B>,
    config: &RoadMapModelConfig,
    path: &Path,
) -> anyhow::Result<()> {
    save_record::<B, _, _>(model.clone(), config, path)
}

pub fn load_roadmap<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<(RoadMapModelConfig, RoadMapModel<B>)> {
    let config: RoadMapModelConfig = load_config(path)?;
    let model = config
        .init::<B>(device)
        .load_file(path, &Recorder::new(), device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
    Ok((config, model))
}

pub fn save_baseline<B: Backend>(
    model: &LegacyRoadMap<B>,
    config: &LegacyRoadMapConfig,
    path: &Path,
) -> anyhow::Result<()> {
    save_record::<B, _, _>(model.clone(), config, path)
}

/// Replace the baseline's feature extractor weights with a stored extractor record.
pub fn load_extractor_weights<B: Backend>(
    mut model: LegacyRoadMap<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<LegacyRoadMap<B>> {
    model.extractor = model
        .extractor
        .load_file(path, &Recorder::new(), device)
        .map_err(|e| anyhow::anyhow!("failed to load extractor weights {}: {e}", path.display()))?;
    Ok(model)
}

/// Tracks the lowest validation loss and decides when `best.bin` should be rewritten.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    dir: PathBuf,
    best: Option<f32>,
}

impl BestCheckpoint {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            dir: checkpoint_dir(run_dir),
            best: None,
        }
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join("best.bin")
    }

    pub fn last_path(&self) -> PathBuf {
        self.dir.join("last.bin")
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }

    /// `best.bin` when one was written, otherwise `last.bin`; an error when neither exists.
    pub fn written_path(&self) -> anyhow::Result<PathBuf> {
        [self.best_path(), self.last_path()]
            .into_iter()
            .find(|p| p.exists())
            .with_context(|| format!("no checkpoint was written under {}", self.dir.display()))
    }

    /// Record a validation loss; true when it improves on every earlier one.
    pub fn improved(&mut self, val_loss: f32) -> bool {
        if !val_loss.is_finite() {
            return false;
        }
        match self.best {
            Some(best) if val_loss >= best => false,
            _ => {
                self.best = Some(val_loss);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_tracks_strict_improvements() {
        let mut best = BestCheckpoint::new(Path::new("runs/x"));
        assert!(best.improved(1.0));
        assert!(!best.improved(1.0));
        assert!(best.improved(0.5));
        assert!(!best.improved(f32::NAN));
        assert!(!best.improved(0.7));
        assert_eq!(best.best(), Some(0.5));
        assert_eq!(best.best_path(), PathBuf::from("runs/x/checkpoints/best.bin"));
    }

    #[test]
    fn written_path_requires_a_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let best = BestCheckpoint::new(tmp.path());
        assert!(best.written_path().is_err());

        fs::create_dir_all(checkpoint_dir(tmp.path())).unwrap();
        fs::write(best.last_path(), b"").unwrap();
        assert_eq!(best.written_path().unwrap(), best.last_path());
        fs::write(best.best_path(), b"").unwrap();
        assert_eq!(best.written_path().unwrap(), best.best_path());
    }

    #[test]
    fn sidecar_swaps_extension() {
        assert_eq!(
            config_sidecar(Path::new("ckpt/best.bin")),
            PathBuf::from("ckpt/best.json")
        );
    }
}
