use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use training::checkpoint::{
    config_sidecar, load_autoencoder, load_pretrained_encoder, load_roadmap, save_autoencoder,
    save_roadmap,
};
use training::{AutoencoderConfig, RoadMapModelConfig};

type B = NdArray<f32>;

fn tiny() -> AutoencoderConfig {
    AutoencoderConfig::new()
        .with_hidden_dim(16)
        .with_latent_dim(8)
        .with_input_height(32)
        .with_input_width(192)
        .with_output_height(32)
        .with_output_width(32)
}

#[test]
fn reloaded_encoder_reproduces_outputs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let device = Default::default();
    let config = tiny();
    let model = config.init::<B>(&device);
    let path = tmp.path().join("checkpoints").join("best.bin");
    save_autoencoder(&model, &config, &path)?;
    assert!(path.exists());
    assert!(config_sidecar(&path).exists());

    let input = Tensor::<B, 4>::random([2, 3, 32, 192], Distribution::Default, &device);
    let expected = model
        .encoder
        .forward(input.clone())
        .into_data()
        .to_vec::<f32>()
        .unwrap();

    let (loaded_config, encoder) = load_pretrained_encoder::<B>(&path, &device)?;
    assert_eq!(loaded_config.latent_dim, 8);
    let actual = encoder.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
    assert_eq!(expected, actual);

    let (_, full) = load_autoencoder::<B>(&path, &device)?;
    assert_eq!(full.forward(input).dims(), [2, 3, 32, 32]);
    Ok(())
}

#[test]
fn roadmap_checkpoint_keeps_map_size() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let device = Default::default();
    let config = RoadMapModelConfig::new(tiny()).with_map_size(4);
    let model = config.init::<B>(&device);
    let path = tmp.path().join("last.bin");
    save_roadmap(&model, &config, &path)?;

    let (loaded_config, loaded) = load_roadmap::<B>(&path, &device)?;
    assert_eq!(loaded_config.map_size, 4);
    let views = Tensor::<B, 5>::random([1, 6, 3, 32, 32], Distribution::Default, &device);
    let a = model.forward(views.clone())?.into_data().to_vec::<f32>().unwrap();
    let b = loaded.forward(views)?.into_data().to_vec::<f32>().unwrap();
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn missing_checkpoint_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    assert!(load_pretrained_encoder::<B>(&tmp.path().join("nope.bin"), &device).is_err());
}
