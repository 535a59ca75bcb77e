//! Dataset indexing, scene-level splitting and Burn-compatible batching for six-camera scenes.
//!
//! This crate provides utilities for:
//! - Indexing `scene_<S>/sample_<I>` directories and decoding the six camera views
//! - Deriving binary road maps from the `ego.png` top-down render
//! - Train/validation splits at scene granularity (no temporal leakage between splits)
//! - Seeded, per-epoch shuffled batch iteration producing Burn tensors

pub mod batch;
pub mod layout;
pub mod splits;
pub mod types;

pub use batch::{BatchConfig, BatchIter, SceneBatch};
pub use layout::{
    index_scenes, load_sample, road_map_from_ego, CAMERA_NAMES, LABELED_SCENES, ROAD_MAP_FILE,
    SAMPLES_PER_SCENE, UNLABELED_SCENES,
};
pub use splits::{split_scenes, split_scenes_at, SceneSplit};
pub use types::*;
