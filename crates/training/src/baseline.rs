//! Legacy baseline: frozen ResNet-style features, trainable linear head, BCE.

use anyhow::Context;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use models::LegacyRoadMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scene_dataset::{index_scenes, split_scenes_at, BatchConfig, BatchIter, SceneBatch};

use crate::checkpoint::{load_extractor_weights, save_baseline, BestCheckpoint};
use crate::config::{BaselineArgs, BaselineTrainConfig};
use crate::logger::{ExperimentLogger, JsonlLogger};
use crate::metrics::{bce_loss, rounded_threat_score, MeanAccumulator};
use crate::util::{scalar, validate_backend_choice, write_run_config};
use crate::ADBackend;

/// `[b, h, w]` road maps flattened to the baseline's `[b, h * w]` output layout.
fn flat_truth<B: Backend>(
    batch: SceneBatch<B>,
) -> anyhow::Result<(Tensor<B, 5>, Tensor<B, 2>)> {
    let maps = batch
        .road_maps
        .context("baseline training needs labeled batches")?;
    let [b, h, w] = maps.dims();
    Ok((batch.views, maps.reshape([b, h * w])))
}

#[derive(Debug, Clone, Copy)]
pub struct BaselineValidation {
    pub avg_val_loss: f32,
    pub avg_val_ts_rounded: f32,
}

fn validate_baseline<B: Backend>(
    model: &LegacyRoadMap<B>,
    valid: &mut BatchIter,
    max_batches: Option<usize>,
    device: &B::Device,
) -> anyhow::Result<Option<BaselineValidation>> {
    valid.start_epoch();
    let mut losses = MeanAccumulator::default();
    let mut scores = MeanAccumulator::default();
    while let Some(batch) = valid.next_batch::<B>(device)? {
        let (views, truth) = flat_truth(batch)?;
        let pred = model.forward(views)?;
        if pred.dims() != truth.dims() {
            anyhow::bail!(
                "baseline predicts {:?} but the road maps are {:?}",
                pred.dims(),
                truth.dims()
            );
        }
        losses.push(scalar(bce_loss(pred.clone(), truth.clone())));
        scores.push(rounded_threat_score(pred, truth));
        if max_batches.is_some_and(|max| losses.count() >= max) {
            break;
        }
    }
    Ok(losses
        .mean()
        .zip(scores.mean())
        .map(|(avg_val_loss, avg_val_ts_rounded)| BaselineValidation {
            avg_val_loss,
            avg_val_ts_rounded,
        }))
}

/// Train the head; in `fast_dev_run` mode a single train and validation batch are used
/// and no checkpoint is written.
pub fn fit_baseline<B: AutodiffBackend>(
    mut model: LegacyRoadMap<B>,
    cfg: &BaselineTrainConfig,
    train: &mut BatchIter,
    valid: &mut BatchIter,
    logger: &mut dyn ExperimentLogger,
    device: &B::Device,
) -> anyhow::Result<(LegacyRoadMap<B>, Option<BaselineValidation>)> {
    let mut optim = AdamConfig::new().init();
    let mut best = BestCheckpoint::new(&cfg.run_dir);
    let max_batches = cfg.fast_dev_run.then_some(1);
    let mut last = None;
    let mut global_step = 0usize;

    for epoch in 0..cfg.epochs {
        train.start_epoch();
        let mut train_loss = MeanAccumulator::default();
        while let Some(batch) = train.next_batch::<B>(device)? {
            let (views, truth) = flat_truth(batch)?;
            let pred = model.forward_frozen(views)?;
            let loss = bce_loss(pred, truth);
            let loss_val = scalar(loss.clone().detach());
            if !loss_val.is_finite() {
                anyhow::bail!("non-finite baseline loss {loss_val} at epoch {epoch}");
            }
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);
            logger.log_scalar("train_loss", loss_val, global_step)?;
            train_loss.push(loss_val);
            global_step += 1;
            if max_batches.is_some_and(|max| train_loss.count() >= max) {
                break;
            }
        }

        last = validate_baseline(&model.valid(), valid, max_batches, device)?;
        log::info!(
            "baseline epoch {epoch}: train_loss {:.4} {}",
            train_loss.mean().unwrap_or(f32::NAN),
            last.map_or("no validation batches".to_string(), |v| format!(
                "avg_val_loss {:.4} avg_val_ts_rounded {:.4}",
                v.avg_val_loss, v.avg_val_ts_rounded
            ))
        );
        if let Some(v) = last {
            logger.log_scalar("avg_val_loss", v.avg_val_loss, epoch)?;
            logger.log_scalar("avg_val_ts_rounded", v.avg_val_ts_rounded, epoch)?;
            if !cfg.fast_dev_run && best.improved(v.avg_val_loss) {
                save_baseline(&model, &cfg.model, &best.best_path())?;
            }
        }
        if cfg.fast_dev_run {
            log::info!("fast_dev_run: stopping after one batch, no checkpoint written");
            break;
        }
        save_baseline(&model, &cfg.model, &best.last_path())?;
    }
    Ok((model, last))
}

pub fn run_baseline(args: BaselineArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    train_baseline(&BaselineTrainConfig::from_args(&args)).map(|_| ())
}

/// Shuffle labeled scenes, keep the first `train_scenes` for training and fit the head.
pub fn train_baseline(cfg: &BaselineTrainConfig) -> anyhow::Result<Option<BaselineValidation>> {
    let device = <ADBackend as Backend>::Device::default();
    ADBackend::seed(cfg.seed);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let split = split_scenes_at(cfg.scenes.clone(), cfg.train_scenes, &mut rng);
    log::info!(
        "baseline: {} train scenes, {} validation scenes",
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

    let mut model = cfg.model.init::<ADBackend>(&device);
    if let Some(path) = &cfg.extractor_weights {
        model = load_extractor_weights(model, path, &device)?;
        log::info!("loaded extractor weights from {}", path.display());
    }

    write_run_config(&cfg.run_dir, cfg)?;
    let mut logger = JsonlLogger::create(&cfg.run_dir)?;
    let (_, summary) = fit_baseline(model, cfg, &mut train, &mut valid, &mut logger, &device)?;
    Ok(summary)
}
