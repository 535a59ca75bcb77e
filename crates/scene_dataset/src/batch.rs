//! Batch iteration for training and validation.

use crate::layout::{load_sample, CAMERA_NAMES};
use crate::types::{DatasetError, DatasetResult, SampleIndex, SceneSample};
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Reshuffle sample order at the start of every epoch.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
    /// Load `ego.png` road maps alongside the camera views.
    pub labeled: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            shuffle: true,
            seed: None,
            drop_last: false,
            labeled: false,
        }
    }
}

pub struct SceneBatch<B: Backend> {
    /// `[batch, 6, 3, height, width]`, camera views in disk order.
    pub views: Tensor<B, 5>,
    /// `[batch, map_height, map_width]`, present for labeled iterators.
    pub road_maps: Option<Tensor<B, 3>>,
    pub indices: Vec<SampleIndex>,
}

pub struct BatchIter {
    indices: Vec<SampleIndex>,
    cursor: usize,
    cfg: BatchConfig,
    rng: StdRng,
    epoch: usize,
    processed_batches: usize,
    total_load_time: Duration,
    views_buf: Vec<f32>,
    maps_buf: Vec<f32>,
}

impl BatchIter {
    pub fn from_indices(indices: Vec<SampleIndex>, cfg: BatchConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut iter = Self {
            indices,
            cursor: 0,
            cfg,
            rng,
            epoch: 0,
            processed_batches: 0,
            total_load_time: Duration::ZERO,
            views_buf: Vec::new(),
            maps_buf: Vec::new(),
        };
        iter.reshuffle();
        iter
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of batches one full pass yields.
    pub fn batches_per_epoch(&self) -> usize {
        let size = self.cfg.batch_size.max(1);
        if self.cfg.drop_last {
            self.indices.len() / size
        } else {
            self.indices.len().div_ceil(size)
        }
    }

    /// Rewind to the start; reshuffles when the iterator was built with `shuffle`.
    pub fn start_epoch(&mut self) {
        if self.cursor > 0 {
            self.epoch += 1;
            self.reshuffle();
        }
        self.cursor = 0;
    }

    fn reshuffle(&mut self) {
        if self.cfg.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<SceneBatch<B>>> {
        let batch_size = self.cfg.batch_size.max(1);
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.indices.len());
        if self.cfg.drop_last && end - self.cursor < batch_size {
            self.cursor = self.indices.len();
            return Ok(None);
        }
        let slice = &self.indices[self.cursor..end];
        self.cursor = end;

        let labeled = self.cfg.labeled;
        let t_load = Instant::now();
        let loaded: Vec<DatasetResult<SceneSample>> = slice
            .par_iter()
            .map(|idx| load_sample(idx, labeled))
            .collect();
        self.total_load_time += t_load.elapsed();

        self.views_buf.clear();
        self.maps_buf.clear();
        let mut view_size: Option<(u32, u32)> = None;
        let mut map_size: Option<(u32, u32)> = None;
        let mut indices = Vec::with_capacity(loaded.len());
        for sample in loaded {
            let sample = sample?;
            let dims = (sample.width, sample.height);
            match view_size {
                None => view_size = Some(dims),
                Some(expected) if expected != dims => {
                    return Err(DatasetError::SizeMismatch {
                        path: sample.index.dir.clone(),
                        expected,
                        actual: dims,
                    });
                }
                Some(_) => {}
            }
            self.views_buf.extend_from_slice(&sample.views);
            if let Some(map) = &sample.road_map {
                let dims = (map.width, map.height);
                match map_size {
                    None => map_size = Some(dims),
                    Some(expected) if expected != dims => {
                        return Err(DatasetError::SizeMismatch {
                            path: sample.index.dir.clone(),
                            expected,
                            actual: dims,
                        });
                    }
                    Some(_) => {}
                }
                self.maps_buf.extend_from_slice(&map.cells);
            }
            indices.push(sample.index);
        }

        let batch_len = indices.len();
        let (width, height) = view_size.unwrap_or((0, 0));
        let views = Tensor::<B, 1>::from_floats(self.views_buf.as_slice(), device).reshape([
            batch_len,
            CAMERA_NAMES.len(),
            3,
            height as usize,
            width as usize,
        ]);
        let road_maps = map_size.map(|(map_w, map_h)| {
            Tensor::<B, 1>::from_floats(self.maps_buf.as_slice(), device).reshape([
                batch_len,
                map_h as usize,
                map_w as usize,
            ])
        });

        self.processed_batches += 1;
        log::trace!(
            "[dataset] epoch={} batch={} samples={} avg_load_ms={:.2}",
            self.epoch,
            self.processed_batches,
            batch_len,
            self.total_load_time.as_secs_f64() * 1000.0 / self.processed_batches as f64
        );

        Ok(Some(SceneBatch {
            views,
            road_maps,
            indices,
        }))
    }
}
