//! Road-map regression on labeled scenes with a staged pretrained encoder.

use anyhow::Context;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use models::{wide_stitch, EncoderStage, RoadMapModel, RoadMapModelConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scene_dataset::{index_scenes, split_scenes, BatchConfig, BatchIter, SceneBatch};
use std::path::PathBuf;

use crate::checkpoint::{load_pretrained_encoder, save_roadmap, BestCheckpoint};
use crate::config::{RoadMapArgs, RoadMapLoss, RoadMapTrainConfig};
use crate::logger::{grid_from_maps, grid_from_tensor, ExperimentLogger, JsonlLogger};
use crate::metrics::{binarize, roadmap_loss, rounded_threat_score, MeanAccumulator};
use crate::schedule::FreezeSchedule;
use crate::util::{first_sample, scalar, validate_backend_choice, write_run_config};
use crate::ADBackend;

pub struct RoadMapStep<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub wide: Tensor<B, 4>,
    pub prediction: Tensor<B, 3>,
    pub truth: Tensor<B, 3>,
}

fn labeled_parts<B: Backend>(
    batch: SceneBatch<B>,
) -> anyhow::Result<(Tensor<B, 5>, Tensor<B, 3>)> {
    let maps = batch
        .road_maps
        .context("road-map training needs labeled batches")?;
    Ok((batch.views, maps))
}

/// Forward pass and loss for one labeled batch.
pub fn roadmap_step<B: Backend>(
    model: &RoadMapModel<B>,
    views: Tensor<B, 5>,
    truth: Tensor<B, 3>,
    stage: EncoderStage,
    loss: RoadMapLoss,
) -> anyhow::Result<RoadMapStep<B>> {
    let [_, map_h, map_w] = truth.dims();
    if map_h != model.map_size() || map_w != model.map_size() {
        anyhow::bail!(
            "road map is {map_h}x{map_w} but the model predicts {0}x{0}",
            model.map_size()
        );
    }
    let wide = wide_stitch(views)?;
    let prediction = model.forward_wide(wide.clone(), stage);
    let loss = roadmap_loss(loss, prediction.clone(), truth.clone());
    Ok(RoadMapStep {
        loss,
        wide,
        prediction,
        truth,
    })
}

/// Apply one optimizer update from a computed step. While the step was taken with the
/// encoder `Frozen` the encoder has no gradient and Adam leaves its parameters untouched.
pub fn roadmap_train_step<B: AutodiffBackend, O: Optimizer<RoadMapModel<B>, B>>(
    model: RoadMapModel<B>,
    optim: &mut O,
    step: RoadMapStep<B>,
    learning_rate: f64,
) -> anyhow::Result<(RoadMapModel<B>, f32)> {
    let loss_val = scalar(step.loss.clone().detach());
    if !loss_val.is_finite() {
        anyhow::bail!("non-finite road-map loss {loss_val}");
    }
    let grads = GradientsParams::from_grads(step.loss.backward(), &model);
    Ok((optim.step(learning_rate, model, grads), loss_val))
}

fn log_roadmaps<B: Backend>(
    logger: &mut dyn ExperimentLogger,
    phase: &str,
    step: &RoadMapStep<B>,
    global_step: usize,
) -> anyhow::Result<()> {
    logger.log_image(
        &format!("{phase}_input_images"),
        &grid_from_tensor(first_sample(step.wide.clone()))?,
        global_step,
    )?;
    logger.log_image(
        &format!("{phase}_target_roadmaps"),
        &grid_from_maps(first_sample(step.truth.clone()))?,
        global_step,
    )?;
    logger.log_image(
        &format!("{phase}_pred_roadmaps"),
        &grid_from_maps(binarize(first_sample(step.prediction.clone())))?,
        global_step,
    )
}

/// Validation averages over batches.
#[derive(Debug, Clone, Copy)]
pub struct RoadMapValidation {
    pub avg_val_loss: f32,
    pub avg_val_ts_rounded: f32,
}

/// Mean loss and rounded threat score over the validation batches; image grids are
/// logged every `output_img_freq` batches starting at `global_step`.
pub fn validate_roadmap<B: Backend>(
    model: &RoadMapModel<B>,
    valid: &mut BatchIter,
    cfg: &RoadMapTrainConfig,
    logger: &mut dyn ExperimentLogger,
    global_step: usize,
    device: &B::Device,
) -> anyhow::Result<Option<RoadMapValidation>> {
    valid.start_epoch();
    let mut losses = MeanAccumulator::default();
    let mut scores = MeanAccumulator::default();
    let mut batch_idx = 0usize;
    while let Some(batch) = valid.next_batch::<B>(device)? {
        let (views, truth) = labeled_parts(batch)?;
        let step = roadmap_step(model, views, truth, EncoderStage::Unfrozen, cfg.loss)?;
        if batch_idx % cfg.output_img_freq.max(1) == 0 {
            log_roadmaps(logger, "valid", &step, global_step + batch_idx)?;
        }
        batch_idx += 1;
        losses.push(scalar(step.loss));
        scores.push(rounded_threat_score(step.prediction, step.truth));
    }
    Ok(losses
        .mean()
        .zip(scores.mean())
        .map(|(avg_val_loss, avg_val_ts_rounded)| RoadMapValidation {
            avg_val_loss,
            avg_val_ts_rounded,
        }))
}

/// Two-stage training loop: frozen encoder until `unfreeze_epoch`, then fine-tuning.
pub fn fit_roadmap<B: AutodiffBackend>(
    mut model: RoadMapModel<B>,
    model_config: &RoadMapModelConfig,
    cfg: &RoadMapTrainConfig,
    train: &mut BatchIter,
    valid: &mut BatchIter,
    logger: &mut dyn ExperimentLogger,
    device: &B::Device,
) -> anyhow::Result<RoadMapModel<B>> {
    let mut optim = AdamConfig::new().init();
    let mut schedule = FreezeSchedule::new(cfg.unfreeze_epoch);
    let mut best = BestCheckpoint::new(&cfg.run_dir);
    let mut global_step = 0usize;
    log::info!(
        "road map: encoder {} until epoch {}",
        schedule.stage(),
        schedule.unfreeze_epoch()
    );

    for epoch in 0..cfg.epochs {
        if let Some(stage) = schedule.on_epoch_start(epoch) {
            log::info!("epoch {epoch}: encoder now {stage}");
        }
        let stage = schedule.stage();
        train.start_epoch();
        let mut train_loss = MeanAccumulator::default();
        let mut batch_idx = 0usize;
        while let Some(batch) = train.next_batch::<B>(device)? {
            let (views, truth) = labeled_parts(batch)?;
            let step = roadmap_step(&model, views, truth, stage, cfg.loss)?;
            if batch_idx % cfg.output_img_freq.max(1) == 0 {
                log_roadmaps(logger, "train", &step, global_step)?;
            }
            let (next, loss_val) =
                roadmap_train_step(model, &mut optim, step, cfg.learning_rate)?;
            model = next;
            logger.log_scalar("train_loss", loss_val, global_step)?;
            train_loss.push(loss_val);
            batch_idx += 1;
            global_step += 1;
        }

        let summary =
            validate_roadmap(&model.valid(), valid, cfg, logger, global_step, device)?;
        match summary {
            Some(v) => {
                log::info!(
                    "epoch {epoch} [{}]: train_loss {:.4} avg_val_loss {:.4} avg_val_ts_rounded {:.4}",
                    stage,
                    train_loss.mean().unwrap_or(f32::NAN),
                    v.avg_val_loss,
                    v.avg_val_ts_rounded
                );
                logger.log_scalar("avg_val_loss", v.avg_val_loss, epoch)?;
                logger.log_scalar("avg_val_ts_rounded", v.avg_val_ts_rounded, epoch)?;
                if best.improved(v.avg_val_loss) {
                    save_roadmap(&model, model_config, &best.best_path())?;
                }
            }
            None => log::warn!("epoch {epoch}: no validation batches"),
        }
        save_roadmap(&model, model_config, &best.last_path())?;
    }
    Ok(model)
}

pub fn run_roadmap(args: RoadMapArgs) -> anyhow::Result<PathBuf> {
    validate_backend_choice(args.backend)?;
    train_roadmap(&RoadMapTrainConfig::from_args(&args))
}

/// Load the pretrained encoder, split labeled scenes and train the regressor.
pub fn train_roadmap(cfg: &RoadMapTrainConfig) -> anyhow::Result<PathBuf> {
    cfg.validate()?;
    let device = <ADBackend as Backend>::Device::default();
    ADBackend::seed(cfg.seed);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let (encoder_config, encoder) =
        load_pretrained_encoder::<ADBackend>(&cfg.pretrained_path, &device).with_context(|| {
            format!(
                "loading pretrained autoencoder {}",
                cfg.pretrained_path.display()
            )
        })?;
    let model_config = cfg.model_config(encoder_config);
    let model = RoadMapModel::from_encoder(encoder, model_config.map_size, &device);

    let split = split_scenes(cfg.scenes.clone(), cfg.train_fraction, &mut rng);
    log::info!(
        "road map: {} train scenes, {} validation scenes",
        split.train.len(),
        split.valid.len()
    );
    let train_idx = index_scenes(&cfg.link, &split.train)
        .with_context(|| format!("indexing train scenes under {}", cfg.link.display()))?;
    let valid_idx = index_scenes(&cfg.link, &split.valid)
        .with_context(|| format!("indexing validation scenes under {}", cfg.link.display()))?;
    let batches = |shuffle| BatchConfig {
        batch_size: cfg.batch_size,
        shuffle,
        seed: Some(cfg.seed),
        drop_last: false,
        labeled: true,
    };
    let mut train = BatchIter::from_indices(train_idx, batches(true));
    let mut valid = BatchIter::from_indices(valid_idx, batches(false));

    write_run_config(&cfg.run_dir, cfg)?;
    let mut logger = JsonlLogger::create(&cfg.run_dir)?;
    fit_roadmap(
        model,
        &model_config,
        cfg,
        &mut train,
        &mut valid,
        &mut logger,
        &device,
    )?;

    BestCheckpoint::new(&cfg.run_dir).written_path()
}
