//! Six-to-one autoencoder pretraining on unlabeled scenes.

use anyhow::Context;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use models::{six_to_one, wide_stitch, Autoencoder, MaskedBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scene_dataset::{index_scenes, split_scenes, BatchConfig, BatchIter};
use std::path::PathBuf;

use crate::checkpoint::{save_autoencoder, BestCheckpoint};
use crate::config::{AutoencoderArgs, AutoencoderTrainConfig};
use crate::logger::{grid_from_tensor, ExperimentLogger, JsonlLogger};
use crate::metrics::MeanAccumulator;
use crate::util::{first_sample, scalar, validate_backend_choice, write_run_config};
use crate::ADBackend;

/// Forward pass of one reconstruction step, kept together for logging.
pub struct ReconstructionStep<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub masked: MaskedBatch<B>,
    pub reconstruction: Tensor<B, 4>,
}

/// Stitch, hide one view per sample, reconstruct it and score with MSE.
pub fn reconstruction_step<B: Backend, R: Rng + ?Sized>(
    model: &Autoencoder<B>,
    views: Tensor<B, 5>,
    rng: &mut R,
) -> anyhow::Result<ReconstructionStep<B>> {
    let wide = wide_stitch(views)?;
    let masked = six_to_one(wide, rng)?;
    let reconstruction = model.forward(masked.input.clone());
    if reconstruction.dims() != masked.target.dims() {
        anyhow::bail!(
            "decoder reconstructs views of {:?} but the masked segments are {:?}",
            reconstruction.dims(),
            masked.target.dims()
        );
    }
    let loss = MseLoss::new().forward(
        reconstruction.clone(),
        masked.target.clone(),
        Reduction::Mean,
    );
    Ok(ReconstructionStep {
        loss,
        masked,
        reconstruction,
    })
}

fn log_reconstruction<B: Backend>(
    logger: &mut dyn ExperimentLogger,
    phase: &str,
    step: &ReconstructionStep<B>,
    global_step: usize,
) -> anyhow::Result<()> {
    let input = first_sample(step.masked.input.clone());
    let target = first_sample(step.masked.target.clone());
    let predicted = first_sample(step.reconstruction.clone());
    logger.log_image(
        &format!("{phase}_input_images"),
        &grid_from_tensor(input)?,
        global_step,
    )?;
    logger.log_image(
        &format!("{phase}_target_images"),
        &grid_from_tensor(target)?,
        global_step,
    )?;
    logger.log_image(
        &format!("{phase}_predicted_images"),
        &grid_from_tensor(predicted)?,
        global_step,
    )
}

/// Adam training with per-epoch validation. Returns the model after the last epoch.
pub fn fit_autoencoder<B: AutodiffBackend>(
    mut model: Autoencoder<B>,
    cfg: &AutoencoderTrainConfig,
    train: &mut BatchIter,
    valid: &mut BatchIter,
    logger: &mut dyn ExperimentLogger,
    rng: &mut StdRng,
    device: &B::Device,
) -> anyhow::Result<Autoencoder<B>> {
    let mut optim = AdamConfig::new().init();
    let mut best = BestCheckpoint::new(&cfg.run_dir);
    let mut global_step = 0usize;

    for epoch in 0..cfg.epochs {
        train.start_epoch();
        let mut train_loss = MeanAccumulator::default();
        let mut batch_idx = 0usize;
        while let Some(batch) = train.next_batch::<B>(device)? {
            let step = reconstruction_step(&model, batch.views, rng)?;
            let loss_val = scalar(step.loss.clone().detach());
            if !loss_val.is_finite() {
                anyhow::bail!("non-finite training loss {loss_val} at epoch {epoch} step {global_step}");
            }
            if batch_idx % cfg.output_img_freq.max(1) == 0 {
                log_reconstruction(logger, "train", &step, global_step)?;
            }
            let grads = GradientsParams::from_grads(step.loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);

            logger.log_scalar("train_loss", loss_val, global_step)?;
            train_loss.push(loss_val);
            batch_idx += 1;
            global_step += 1;
        }

        let val_loss =
            validate_autoencoder(&model.valid(), valid, logger, rng, cfg, global_step, device)?;
        log::info!(
            "epoch {epoch}: train_loss {:.4} avg_val_loss {}",
            train_loss.mean().unwrap_or(f32::NAN),
            val_loss.map_or("n/a".to_string(), |v| format!("{v:.4}"))
        );
        if let Some(val_loss) = val_loss {
            logger.log_scalar("avg_val_loss", val_loss, epoch)?;
            if best.improved(val_loss) {
                save_autoencoder(&model, &cfg.model, &best.best_path())?;
                log::info!("new best checkpoint at {}", best.best_path().display());
            }
        }
        save_autoencoder(&model, &cfg.model, &best.last_path())?;
    }
    Ok(model)
}

fn validate_autoencoder<B: Backend>(
    model: &Autoencoder<B>,
    valid: &mut BatchIter,
    logger: &mut dyn ExperimentLogger,
    rng: &mut StdRng,
    cfg: &AutoencoderTrainConfig,
    global_step: usize,
    device: &B::Device,
) -> anyhow::Result<Option<f32>> {
    valid.start_epoch();
    let mut losses = MeanAccumulator::default();
    let mut batch_idx = 0usize;
    while let Some(batch) = valid.next_batch::<B>(device)? {
        let step = reconstruction_step(model, batch.views, rng)?;
        if batch_idx % cfg.output_img_freq.max(1) == 0 {
            log_reconstruction(logger, "valid", &step, global_step + batch_idx)?;
        }
        losses.push(scalar(step.loss));
        batch_idx += 1;
    }
    Ok(losses.mean())
}

/// Parse-level entry point used by the `train_autoencoder` binary.
pub fn run_autoencoder(args: AutoencoderArgs) -> anyhow::Result<PathBuf> {
    validate_backend_choice(args.backend)?;
    let cfg = AutoencoderTrainConfig::from_args(&args);
    train_autoencoder(&cfg)
}

/// Split unlabeled scenes, train, and return the path of the best checkpoint
/// (the last one when no validation batch was available).
pub fn train_autoencoder(cfg: &AutoencoderTrainConfig) -> anyhow::Result<PathBuf> {
    cfg.validate()?;
    let device = <ADBackend as Backend>::Device::default();
    ADBackend::seed(cfg.seed);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let split = split_scenes(cfg.scenes.clone(), cfg.train_fraction, &mut rng);
    log::info!(
        "autoencoder: {} train scenes, {} validation scenes under {}",
        split.train.len(),
        split.valid.len(),
        cfg.link.display()
    );
    let train_idx = index_scenes(&cfg.link, &split.train)
        .with_context(|| format!("indexing train scenes under {}", cfg.link.display()))?;
    let valid_idx = index_scenes(&cfg.link, &split.valid)
        .with_context(|| format!("indexing validation scenes under {}", cfg.link.display()))?;

    let mut train = BatchIter::from_indices(
        train_idx,
        BatchConfig {
            batch_size: cfg.batch_size,
            shuffle: true,
            seed: Some(cfg.seed),
            drop_last: false,
            labeled: false,
        },
    );
    let mut valid = BatchIter::from_indices(
        valid_idx,
        BatchConfig {
            batch_size: cfg.batch_size,
            shuffle: false,
            seed: Some(cfg.seed),
            drop_last: false,
            labeled: false,
        },
    );

    write_run_config(&cfg.run_dir, cfg)?;
    let mut logger = JsonlLogger::create(&cfg.run_dir)?;
    let model = cfg.model.init::<ADBackend>(&device);
    fit_autoencoder(
        model,
        cfg,
        &mut train,
        &mut valid,
        &mut logger,
        &mut rng,
        &device,
    )?;

    let path = BestCheckpoint::new(&cfg.run_dir).written_path()?;
    log::info!("autoencoder checkpoint: {}", path.display());
    Ok(path)
}
