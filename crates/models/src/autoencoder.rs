//! Convolutional autoencoder and the six-to-one masked reconstruction task.

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::Rng;

use crate::stitch::VIEW_COUNT;
use crate::ShapeError;

/// Feature map size after the encoder's adaptive pool: 4 rows, 4 columns per camera view.
const ENCODER_POOL: [usize; 2] = [4, 4 * VIEW_COUNT];
const FEATURE_CHANNELS: usize = 64;

#[derive(Config, Debug)]
pub struct AutoencoderConfig {
    /// Width of the dense layer between conv features and the latent vector.
    #[config(default = 256)]
    pub hidden_dim: usize,
    #[config(default = 128)]
    pub latent_dim: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 256)]
    pub input_height: usize,
    #[config(default = 1836)]
    pub input_width: usize,
    #[config(default = 256)]
    pub output_height: usize,
    #[config(default = 306)]
    pub output_width: usize,
}

impl AutoencoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Autoencoder<B> {
        Autoencoder {
            encoder: self.init_encoder(device),
            decoder: self.init_decoder(device),
        }
    }

    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let conv = |input: usize, output: usize| {
            Conv2dConfig::new([input, output], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Encoder {
            conv1: conv(self.in_channels, 32),
            conv2: conv(32, FEATURE_CHANNELS),
            conv3: conv(FEATURE_CHANNELS, FEATURE_CHANNELS),
            pool: AdaptiveAvgPool2dConfig::new(ENCODER_POOL).init(),
            fc_hidden: LinearConfig::new(
                FEATURE_CHANNELS * ENCODER_POOL[0] * ENCODER_POOL[1],
                self.hidden_dim,
            )
            .init(device),
            fc_latent: LinearConfig::new(self.hidden_dim, self.latent_dim).init(device),
            activation: Relu::new(),
            latent_dim: self.latent_dim,
        }
    }

    pub fn init_decoder<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        // Three stride-2 upsamplings; start from a grid that covers the output after x8.
        let seed_height = self.output_height.div_ceil(8).max(1);
        let seed_width = self.output_width.div_ceil(8).max(1);
        let deconv = |input: usize, output: usize| {
            ConvTranspose2dConfig::new([input, output], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device)
        };
        Decoder {
            fc_hidden: LinearConfig::new(self.latent_dim, self.hidden_dim).init(device),
            fc_grid: LinearConfig::new(
                self.hidden_dim,
                FEATURE_CHANNELS * seed_height * seed_width,
            )
            .init(device),
            deconv1: deconv(FEATURE_CHANNELS, FEATURE_CHANNELS),
            deconv2: deconv(FEATURE_CHANNELS, 32),
            deconv3: deconv(32, self.in_channels),
            activation: Relu::new(),
            seed_height,
            seed_width,
            output_height: self.output_height,
            output_width: self.output_width,
        }
    }
}

/// Maps a wide (stitched) image to a fixed-size latent vector.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    fc_hidden: Linear<B>,
    fc_latent: Linear<B>,
    activation: Relu,
    latent_dim: usize,
}

impl<B: Backend> Encoder<B> {
    /// `[batch, channels, height, width]` -> `[batch, latent_dim]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(x));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.activation.forward(self.conv3.forward(x));
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.activation.forward(self.fc_hidden.forward(x));
        self.fc_latent.forward(x)
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

/// Maps a latent vector back to a single camera view.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    fc_hidden: Linear<B>,
    fc_grid: Linear<B>,
    deconv1: ConvTranspose2d<B>,
    deconv2: ConvTranspose2d<B>,
    deconv3: ConvTranspose2d<B>,
    activation: Relu,
    seed_height: usize,
    seed_width: usize,
    output_height: usize,
    output_width: usize,
}

impl<B: Backend> Decoder<B> {
    /// `[batch, latent_dim]` -> `[batch, channels, output_height, output_width]`.
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = z.dims();
        let x = self.activation.forward(self.fc_hidden.forward(z));
        let x = self.activation.forward(self.fc_grid.forward(x));
        let x = x.reshape([batch, FEATURE_CHANNELS, self.seed_height, self.seed_width]);
        let x = self.activation.forward(self.deconv1.forward(x));
        let x = self.activation.forward(self.deconv2.forward(x));
        let x = self.deconv3.forward(x);
        let channels = x.dims()[1];
        x.slice([
            0..batch,
            0..channels,
            0..self.output_height,
            0..self.output_width,
        ])
    }
}

#[derive(Module, Debug)]
pub struct Autoencoder<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> Autoencoder<B> {
    /// Encode a masked wide image and reconstruct the hidden view.
    pub fn forward(&self, masked: Tensor<B, 4>) -> Tensor<B, 4> {
        self.decoder.forward(self.encoder.forward(masked))
    }
}

/// Output of the six-to-one task: masked input, the hidden views and which slot was hidden.
#[derive(Debug, Clone)]
pub struct MaskedBatch<B: Backend> {
    /// Wide image with one segment per sample set to zero.
    pub input: Tensor<B, 4>,
    /// Original content of the zeroed segments, `[batch, channels, height, width / 6]`.
    pub target: Tensor<B, 4>,
    /// Segment index (0..6) hidden for each sample.
    pub segments: Vec<usize>,
}

/// Pick one of the six segments per sample uniformly at random and mask it.
pub fn six_to_one<B: Backend, R: Rng + ?Sized>(
    wide: Tensor<B, 4>,
    rng: &mut R,
) -> Result<MaskedBatch<B>, ShapeError> {
    let batch = wide.dims()[0];
    let segments: Vec<usize> = (0..batch)
        .map(|_| rng.random_range(0..VIEW_COUNT))
        .collect();
    mask_segments(wide, &segments)
}

/// Mask the given segment of each sample, returning the removed content as the target.
pub fn mask_segments<B: Backend>(
    wide: Tensor<B, 4>,
    segments: &[usize],
) -> Result<MaskedBatch<B>, ShapeError> {
    let [batch, channels, height, width] = wide.dims();
    if width % VIEW_COUNT != 0 {
        return Err(ShapeError::WidthNotDivisible {
            width,
            segments: VIEW_COUNT,
        });
    }
    if segments.len() != batch {
        return Err(ShapeError::SegmentCount {
            expected: batch,
            actual: segments.len(),
        });
    }
    if let Some(&index) = segments.iter().find(|&&s| s >= VIEW_COUNT) {
        return Err(ShapeError::SegmentIndex {
            index,
            segments: VIEW_COUNT,
        });
    }

    let segment_width = width / VIEW_COUNT;
    let device = wide.device();
    let mut input = wide;
    let mut targets = Vec::with_capacity(batch);
    for (b, &segment) in segments.iter().enumerate() {
        let start = segment * segment_width;
        let region = [b..b + 1, 0..channels, 0..height, start..start + segment_width];
        targets.push(input.clone().slice(region.clone()));
        input = input.slice_assign(
            region,
            Tensor::zeros([1, channels, height, segment_width], &device),
        );
    }

    Ok(MaskedBatch {
        input,
        target: Tensor::cat(targets, 0),
        segments: segments.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type B = NdArray<f32>;

    fn ramp(batch: usize, channels: usize, height: usize, width: usize) -> Tensor<B, 4> {
        let len = batch * channels * height * width;
        let data: Vec<f32> = (0..len).map(|i| i as f32 + 1.0).collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), &Default::default())
            .reshape([batch, channels, height, width])
    }

    fn small_config() -> AutoencoderConfig {
        AutoencoderConfig::new()
            .with_hidden_dim(16)
            .with_latent_dim(8)
            .with_input_height(32)
            .with_input_width(192)
            .with_output_height(8)
            .with_output_width(8)
    }

    #[test]
    fn masking_zeroes_exactly_one_segment_per_sample() {
        let wide = ramp(3, 2, 2, 12);
        let original = wide.clone().into_data().to_vec::<f32>().unwrap();
        let masked = mask_segments(wide, &[0, 5, 2]).unwrap();
        let values = masked.input.into_data().to_vec::<f32>().unwrap();

        for b in 0..3 {
            for c in 0..2 {
                for y in 0..2 {
                    let row = ((b * 2 + c) * 2 + y) * 12;
                    for x in 0..12 {
                        let seg = x / 2;
                        let expected = if seg == masked.segments[b] {
                            0.0
                        } else {
                            original[row + x]
                        };
                        assert_eq!(values[row + x], expected, "b={b} c={c} y={y} x={x}");
                    }
                }
            }
        }
    }

    #[test]
    fn target_matches_masked_content() {
        let wide = ramp(2, 1, 2, 12);
        let original = wide.clone().into_data().to_vec::<f32>().unwrap();
        let masked = mask_segments(wide, &[3, 1]).unwrap();
        assert_eq!(masked.target.dims(), [2, 1, 2, 2]);
        let target = masked.target.into_data().to_vec::<f32>().unwrap();
        // sample 0, segment 3 -> columns 6..8
        assert_eq!(&target[0..2], &original[6..8]);
        assert_eq!(&target[2..4], &original[12 + 6..12 + 8]);
        // sample 1, segment 1 -> columns 2..4
        assert_eq!(&target[4..6], &original[24 + 2..24 + 4]);
        assert_eq!(&target[6..8], &original[36 + 2..36 + 4]);
    }

    #[test]
    fn random_masking_covers_all_six_segments() {
        let mut rng = StdRng::seed_from_u64(20200505);
        let mut seen = [false; VIEW_COUNT];
        for _ in 0..50 {
            let masked = six_to_one(ramp(4, 1, 1, 6), &mut rng).unwrap();
            for s in masked.segments {
                seen[s] = true;
            }
        }
        assert!(seen.iter().all(|s| *s), "segments seen: {seen:?}");
    }

    #[test]
    fn masking_rejects_indivisible_width() {
        let err = six_to_one(ramp(1, 1, 1, 10), &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert_eq!(
            err,
            ShapeError::WidthNotDivisible {
                width: 10,
                segments: 6
            }
        );
    }

    #[test]
    fn masking_rejects_out_of_range_segment() {
        let err = mask_segments(ramp(1, 1, 1, 6), &[6]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::SegmentIndex {
                index: 6,
                segments: 6
            }
        );
    }

    #[test]
    fn encoder_and_decoder_shapes() {
        let device = Default::default();
        let model = small_config().init::<B>(&device);
        let latent = model.encoder.forward(Tensor::zeros([2, 3, 32, 192], &device));
        assert_eq!(latent.dims(), [2, 8]);
        let recon = model.decoder.forward(latent);
        assert_eq!(recon.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn decoder_crops_odd_output_sizes() {
        let device = Default::default();
        let model = small_config()
            .with_output_height(5)
            .with_output_width(11)
            .init::<B>(&device);
        let recon = model.forward(Tensor::zeros([1, 3, 32, 192], &device));
        assert_eq!(recon.dims(), [1, 3, 5, 11]);
    }
}
