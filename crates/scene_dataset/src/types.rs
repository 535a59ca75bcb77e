//! Core types and error definitions for scene_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("missing file {path}")]
    MissingFile { path: PathBuf },
    #[error("image {path} is {actual:?}, expected {expected:?}")]
    SizeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("scene {scene} has no sample directories under {path}")]
    EmptyScene { scene: usize, path: PathBuf },
}

/// Location of one scene frame on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIndex {
    pub scene: usize,
    pub sample: usize,
    pub dir: PathBuf,
}

/// Decoded frame: six camera views and, for labeled scenes, the road map.
#[derive(Debug, Clone)]
pub struct SceneSample {
    pub index: SampleIndex,
    /// Views in disk camera order, each CHW, RGB normalized to [0, 1].
    pub views: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub road_map: Option<RoadMap>,
}

/// Binary occupancy grid, row-major, 1.0 = road.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadMap {
    pub cells: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl RoadMap {
    pub fn road_fraction(&self) -> f32 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.cells.iter().sum::<f32>() / self.cells.len() as f32
    }
}
