//! Experiment logging: scalar curves plus image grids, keyed by global step.

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::{Rgb, RgbImage};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Images per grid row, as in the usual `make_grid` layout.
pub const GRID_NROW: usize = 8;
pub const GRID_PADDING: usize = 2;

pub trait ExperimentLogger {
    fn log_scalar(&mut self, name: &str, value: f32, step: usize) -> anyhow::Result<()>;
    fn log_image(&mut self, name: &str, image: &RgbImage, step: usize) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct ScalarRecord<'a> {
    name: &'a str,
    value: f32,
    step: usize,
}

/// Appends scalars to `<run_dir>/metrics.jsonl` and writes images under `<run_dir>/images/`.
pub struct JsonlLogger {
    root: PathBuf,
    metrics: BufWriter<File>,
}

impl JsonlLogger {
    pub fn create(run_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(run_dir.join("images"))
            .with_context(|| format!("creating {}", run_dir.display()))?;
        let path = run_dir.join("metrics.jsonl");
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            root: run_dir.to_path_buf(),
            metrics: BufWriter::new(file),
        })
    }

    pub fn image_path(&self, name: &str, step: usize) -> PathBuf {
        self.root.join("images").join(format!("{name}_{step:06}.png"))
    }
}

impl ExperimentLogger for JsonlLogger {
    fn log_scalar(&mut self, name: &str, value: f32, step: usize) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.metrics, &ScalarRecord { name, value, step })?;
        self.metrics.write_all(b"\n")?;
        self.metrics.flush()?;
        Ok(())
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, step: usize) -> anyhow::Result<()> {
        let path = self.image_path(name, step);
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))
    }
}

/// Keeps scalars and image sizes in memory instead of writing files.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    pub scalars: Vec<(String, f32, usize)>,
    pub images: Vec<(String, u32, u32, usize)>,
}

impl MemoryLogger {
    pub fn values(&self, name: &str) -> Vec<f32> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, v, _)| *v)
            .collect()
    }
}

impl ExperimentLogger for MemoryLogger {
    fn log_scalar(&mut self, name: &str, value: f32, step: usize) -> anyhow::Result<()> {
        self.scalars.push((name.to_string(), value, step));
        Ok(())
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, step: usize) -> anyhow::Result<()> {
        self.images
            .push((name.to_string(), image.width(), image.height(), step));
        Ok(())
    }
}

/// Tile `[n, c, h, w]` images (c = 1 or 3, values in `[0, 1]`) into one padded grid.
pub fn grid_from_tensor<B: Backend>(images: Tensor<B, 4>) -> anyhow::Result<RgbImage> {
    let [n, c, h, w] = images.dims();
    if c != 1 && c != 3 {
        anyhow::bail!("image grid expects 1 or 3 channels, got {c}");
    }
    let values = images
        .clamp(0.0, 1.0)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading image tensor: {e:?}"))?;
    Ok(tile(&values, n, c, h, w))
}

/// Tile `[n, h, w]` road maps as grayscale.
pub fn grid_from_maps<B: Backend>(maps: Tensor<B, 3>) -> anyhow::Result<RgbImage> {
    let [n, h, w] = maps.dims();
    grid_from_tensor(maps.reshape([n, 1, h, w]))
}

fn tile(values: &[f32], n: usize, c: usize, h: usize, w: usize) -> RgbImage {
    let cols = GRID_NROW.min(n.max(1));
    let rows = n.div_ceil(cols).max(1);
    let pad = GRID_PADDING;
    let width = pad + cols * (w + pad);
    let height = pad + rows * (h + pad);
    let mut grid = RgbImage::new(width as u32, height as u32);
    let to_u8 = |v: f32| (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8;

    for k in 0..n {
        let x0 = pad + (k % cols) * (w + pad);
        let y0 = pad + (k / cols) * (h + pad);
        let base = k * c * h * w;
        for y in 0..h {
            for x in 0..w {
                let at = |ch: usize| values[base + ch * h * w + y * w + x];
                let px = if c == 3 {
                    Rgb([to_u8(at(0)), to_u8(at(1)), to_u8(at(2))])
                } else {
                    let v = to_u8(at(0));
                    Rgb([v, v, v])
                };
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, px);
            }
        }
    }
    grid
}
