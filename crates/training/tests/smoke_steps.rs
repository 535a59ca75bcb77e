//! Single optimizer steps on synthetic 2-sample batches (Autodiff<NdArray>).

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use models::FeatureExtractorConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use training::autoencoder::reconstruction_step;
use training::metrics::bce_loss;
use training::roadmap::{roadmap_step, roadmap_train_step};
use training::{
    AutoencoderConfig, EncoderStage, FreezeSchedule, LegacyRoadMapConfig, RoadMapLoss,
    RoadMapModel,
};

type B = NdArray<f32>;
type AD = Autodiff<B>;

fn tiny_autoencoder() -> AutoencoderConfig {
    AutoencoderConfig::new()
        .with_hidden_dim(16)
        .with_latent_dim(8)
        .with_input_height(32)
        .with_input_width(192)
        .with_output_height(32)
        .with_output_width(32)
}

fn views(device: &<AD as burn::tensor::backend::Backend>::Device) -> Tensor<AD, 5> {
    Tensor::random([2, 6, 3, 32, 32], Distribution::Uniform(0.0, 1.0), device)
}

fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

#[test]
fn autoencoder_step_has_finite_loss_and_updates_parameters() {
    let device = Default::default();
    let mut model = tiny_autoencoder().init::<AD>(&device);
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(20200505);
    let probe = Tensor::<B, 4>::ones([1, 3, 32, 192], &device);
    let before = values(model.valid().encoder.forward(probe.clone()));

    let step = reconstruction_step(&model, views(&device), &mut rng).unwrap();
    assert_eq!(step.masked.target.dims(), [2, 3, 32, 32]);
    assert_eq!(step.reconstruction.dims(), [2, 3, 32, 32]);
    let loss: f32 = step.loss.clone().into_scalar();
    assert!(loss.is_finite() && loss >= 0.0, "{loss}");

    let grads = GradientsParams::from_grads(step.loss.backward(), &model);
    model = optim.step(1e-2, model, grads);
    let after = values(model.valid().encoder.forward(probe));
    assert_ne!(before, after);
}

#[test]
fn frozen_encoder_stays_fixed_until_unfrozen() {
    let device = Default::default();
    let encoder = tiny_autoencoder().init_encoder::<AD>(&device);
    let mut model = RoadMapModel::from_encoder(encoder, 4, &device);
    let mut optim = AdamConfig::new().init();
    let probe = Tensor::<B, 4>::ones([1, 3, 32, 192], &device);
    let truth = Tensor::<AD, 3>::ones([2, 4, 4], &device);
    let input = views(&device);
    let mut schedule = FreezeSchedule::new(1);

    schedule.on_epoch_start(0);
    assert_eq!(schedule.stage(), EncoderStage::Frozen);
    let encoder_before = values(model.valid().encoder.forward(probe.clone()));
    let output_before = values(model.valid().forward(input.clone().inner()).unwrap());

    let step = roadmap_step(&model, input.clone(), truth.clone(), schedule.stage(), RoadMapLoss::Mse)
        .unwrap();
    let (next, loss) = roadmap_train_step(model, &mut optim, step, 1e-2).unwrap();
    model = next;
    assert!(loss.is_finite() && loss >= 0.0);
    let encoder_frozen = values(model.valid().encoder.forward(probe.clone()));
    assert_eq!(encoder_before, encoder_frozen);
    let output_after = values(model.valid().forward(input.clone().inner()).unwrap());
    assert_ne!(output_before, output_after, "head should learn while frozen");

    assert_eq!(schedule.on_epoch_start(1), Some(EncoderStage::Unfrozen));
    let step =
        roadmap_step(&model, input, truth, schedule.stage(), RoadMapLoss::Bce).unwrap();
    let (model, _) = roadmap_train_step(model, &mut optim, step, 1e-2).unwrap();
    let encoder_unfrozen = values(model.valid().encoder.forward(probe));
    assert_ne!(encoder_frozen, encoder_unfrozen);
}

#[test]
fn roadmap_step_rejects_wrong_map_size() {
    let device = Default::default();
    let encoder = tiny_autoencoder().init_encoder::<AD>(&device);
    let model = RoadMapModel::from_encoder(encoder, 4, &device);
    let truth = Tensor::<AD, 3>::ones([2, 5, 5], &device);
    assert!(
        roadmap_step(&model, views(&device), truth, EncoderStage::Frozen, RoadMapLoss::Mse)
            .is_err()
    );
}

#[test]
fn reconstruction_step_rejects_mismatched_view_size() {
    let device = Default::default();
    let model = tiny_autoencoder().init::<AD>(&device);
    let mut rng = StdRng::seed_from_u64(0);
    // 16x16 views stitch to 16x96, but the decoder emits 32x32 segments.
    let small = Tensor::<AD, 5>::random([2, 6, 3, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
    assert!(reconstruction_step(&model, small, &mut rng).is_err());
}

#[test]
fn baseline_extractor_stays_fixed_while_head_learns() {
    let device = Default::default();
    let mut model = LegacyRoadMapConfig::new(FeatureExtractorConfig::new())
        .with_map_size(4)
        .init::<AD>(&device);
    let mut optim = AdamConfig::new().init();
    let input = Tensor::<AD, 5>::random([2, 6, 3, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
    let truth = Tensor::<AD, 2>::ones([2, 16], &device);
    let probe = Tensor::<B, 4>::ones([1, 3, 16, 96], &device);
    let features_before = values(model.valid().extractor.forward(probe.clone()));
    let output_before = values(model.valid().forward(input.clone().inner()).unwrap());

    let loss = bce_loss(model.forward_frozen(input.clone()).unwrap(), truth);
    let grads = GradientsParams::from_grads(loss.backward(), &model);
    model = optim.step(1e-2, model, grads);

    assert_eq!(features_before, values(model.valid().extractor.forward(probe)));
    let output_after = values(model.valid().forward(input.inner()).unwrap());
    assert_ne!(output_before, output_after);
}
