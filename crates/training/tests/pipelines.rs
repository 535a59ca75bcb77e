//! End to end on a synthetic dataset: pretrain, then road-map regression from the
//! pretrained checkpoint, then the baseline in fast-dev-run mode.

use clap::Parser;
use image::{Rgb, RgbImage};
use scene_dataset::{CAMERA_NAMES, ROAD_MAP_FILE};
use std::fs;
use std::path::Path;
use scene_dataset::{index_scenes, BatchConfig, BatchIter};
use training::autoencoder::train_autoencoder;
use training::baseline::train_baseline;
use training::roadmap::{fit_roadmap, train_roadmap};
use training::{
    ADBackend, AutoencoderArgs, AutoencoderConfig, AutoencoderTrainConfig, BaselineArgs,
    BaselineTrainConfig, MemoryLogger, RoadMapArgs, RoadMapModel, RoadMapTrainConfig,
};

/// 32x32 camera views (so the wide image is 32x192) and a 4x4 ego render with road on the left.
fn create_scene(root: &Path, scene: usize, samples: usize) -> anyhow::Result<()> {
    for i in 0..samples {
        let dir = root.join(format!("scene_{scene}")).join(format!("sample_{i}"));
        fs::create_dir_all(&dir)?;
        for (cam, name) in CAMERA_NAMES.iter().enumerate() {
            let img = RgbImage::from_fn(32, 32, |x, y| {
                Rgb([(x * 8) as u8, (y * 8) as u8, (cam * 40 + i) as u8])
            });
            img.save(dir.join(name))?;
        }
        let ego = RgbImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        ego.save(dir.join(ROAD_MAP_FILE))?;
    }
    Ok(())
}

fn metric_names(run_dir: &Path) -> anyhow::Result<String> {
    Ok(fs::read_to_string(run_dir.join("metrics.jsonl"))?)
}

#[test]
fn pretrain_then_roadmap_then_baseline() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data = tmp.path().join("data");
    for scene in 0..6 {
        create_scene(&data, scene, 2)?;
    }
    let link = data.to_string_lossy().to_string();

    let ae_dir = tmp.path().join("ae");
    let args = AutoencoderArgs::parse_from([
        "train_autoencoder",
        "--hidden-dim",
        "16",
        "--latent-dim",
        "8",
        "--batch-size",
        "2",
        "--input-width",
        "192",
        "--input-height",
        "32",
        "--output-width",
        "32",
        "--output-height",
        "32",
        "--epochs",
        "1",
        "--output-img-freq",
        "1",
        "--link",
        &link,
        "--run-dir",
        ae_dir.to_str().unwrap(),
    ]);
    let mut ae_cfg = AutoencoderTrainConfig::from_args(&args);
    ae_cfg.scenes = 0..3;
    let pretrained = train_autoencoder(&ae_cfg)?;
    assert!(pretrained.exists());
    let metrics = metric_names(&ae_dir)?;
    assert!(metrics.contains("train_loss"));
    assert!(metrics.contains("avg_val_loss"));
    assert!(ae_dir.join("images/train_predicted_images_000000.png").exists());
    assert!(ae_dir.join("config.json").exists());

    let rm_dir = tmp.path().join("roadmap");
    let args = RoadMapArgs::parse_from([
        "train_roadmap",
        "--pretrained-path",
        pretrained.to_str().unwrap(),
        "--batch-size",
        "2",
        "--map-size",
        "4",
        "--unfreeze-epoch",
        "1",
        "--epochs",
        "2",
        "--link",
        &link,
        "--run-dir",
        rm_dir.to_str().unwrap(),
    ]);
    let mut rm_cfg = RoadMapTrainConfig::from_args(&args);
    rm_cfg.scenes = 3..6;
    let best = train_roadmap(&rm_cfg)?;
    assert!(best.exists());
    let metrics = metric_names(&rm_dir)?;
    assert!(metrics.contains("avg_val_ts_rounded"));
    assert_eq!(metrics.matches("avg_val_loss").count(), 2);

    let bl_dir = tmp.path().join("baseline");
    let args = BaselineArgs::parse_from([
        "train_baseline",
        "--map-size",
        "4",
        "--train-scenes",
        "2",
        "--link",
        &link,
        "--run-dir",
        bl_dir.to_str().unwrap(),
    ]);
    let mut bl_cfg = BaselineTrainConfig::from_args(&args);
    bl_cfg.scenes = 3..6;
    let summary = train_baseline(&bl_cfg)?.expect("one validation batch");
    assert!(summary.avg_val_loss.is_finite());
    assert!((0.0..=1.0).contains(&summary.avg_val_ts_rounded));
    assert!(!bl_dir.join("checkpoints").exists());
    Ok(())
}

#[test]
fn roadmap_fit_logs_curves_and_grids() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data = tmp.path().join("data");
    for scene in 0..2 {
        create_scene(&data, scene, 2)?;
    }
    let args = RoadMapArgs::parse_from([
        "train_roadmap",
        "--pretrained-path",
        "unused.bin",
        "--batch-size",
        "2",
        "--map-size",
        "4",
        "--unfreeze-epoch",
        "1",
        "--epochs",
        "2",
        "--output-img-freq",
        "1",
        "--run-dir",
        tmp.path().join("run").to_str().unwrap(),
    ]);
    let cfg = RoadMapTrainConfig::from_args(&args);
    let encoder_config = AutoencoderConfig::new()
        .with_hidden_dim(16)
        .with_latent_dim(8)
        .with_input_height(32)
        .with_input_width(192)
        .with_output_height(32)
        .with_output_width(32);
    let model_config = cfg.model_config(encoder_config.clone());
    let device = Default::default();
    let model = RoadMapModel::from_encoder(
        encoder_config.init_encoder::<ADBackend>(&device),
        model_config.map_size,
        &device,
    );
    let batches = |shuffle| BatchConfig {
        batch_size: 2,
        shuffle,
        seed: Some(0),
        drop_last: false,
        labeled: true,
    };
    let mut train = BatchIter::from_indices(index_scenes(&data, &[0])?, batches(true));
    let mut valid = BatchIter::from_indices(index_scenes(&data, &[1])?, batches(false));
    let mut logger = MemoryLogger::default();

    fit_roadmap(model, &model_config, &cfg, &mut train, &mut valid, &mut logger, &device)?;

    assert_eq!(logger.values("train_loss").len(), 2);
    let ts = logger.values("avg_val_ts_rounded");
    assert_eq!(ts.len(), 2);
    assert!(ts.iter().all(|v| (0.0..=1.0).contains(v)));
    let names: Vec<&str> = logger.images.iter().map(|(n, ..)| n.as_str()).collect();
    assert!(names.contains(&"train_pred_roadmaps"));
    assert!(names.contains(&"valid_pred_roadmaps"));
    assert!(tmp.path().join("run/checkpoints/last.bin").exists());
    Ok(())
}
