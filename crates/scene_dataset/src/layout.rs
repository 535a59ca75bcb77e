//! On-disk scene layout: indexing sample directories and decoding frames.

use crate::types::{DatasetError, DatasetResult, RoadMap, SampleIndex, SceneSample};
use image::RgbImage;
use std::fs;
use std::ops::Range;
use std::path::Path;

/// Camera files per sample, in disk order (index 0..6).
pub const CAMERA_NAMES: [&str; 6] = [
    "CAM_FRONT_LEFT.jpeg",
    "CAM_FRONT.jpeg",
    "CAM_FRONT_RIGHT.jpeg",
    "CAM_BACK_LEFT.jpeg",
    "CAM_BACK.jpeg",
    "CAM_BACK_RIGHT.jpeg",
];

/// Top-down ego render for labeled samples; white pixels are off-road.
pub const ROAD_MAP_FILE: &str = "ego.png";

pub const UNLABELED_SCENES: Range<usize> = 0..106;
pub const LABELED_SCENES: Range<usize> = 106..134;
pub const SAMPLES_PER_SCENE: usize = 126;

fn parse_numbered(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Index every `sample_<I>` directory of the given scenes under `root`.
///
/// Samples come back grouped by scene (in the order given) and sorted by sample number.
pub fn index_scenes(root: &Path, scenes: &[usize]) -> DatasetResult<Vec<SampleIndex>> {
    let mut indices = Vec::with_capacity(scenes.len() * SAMPLES_PER_SCENE);
    for &scene in scenes {
        let scene_dir = root.join(format!("scene_{scene}"));
        let entries = fs::read_dir(&scene_dir).map_err(|e| DatasetError::Io {
            path: scene_dir.clone(),
            source: e,
        })?;
        let mut samples = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DatasetError::Io {
                path: scene_dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(sample) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| parse_numbered(n, "sample_"))
            else {
                continue;
            };
            samples.push(SampleIndex {
                scene,
                sample,
                dir: path,
            });
        }
        if samples.is_empty() {
            return Err(DatasetError::EmptyScene {
                scene,
                path: scene_dir,
            });
        }
        samples.sort_by_key(|s| s.sample);
        log::debug!("indexed scene {scene}: {} samples", samples.len());
        indices.extend(samples);
    }
    Ok(indices)
}

fn open_rgb(path: &Path) -> DatasetResult<RgbImage> {
    if !path.exists() {
        return Err(DatasetError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(img.to_rgb8())
}

/// Decode the six camera views of a sample (and its road map when `labeled`).
pub fn load_sample(index: &SampleIndex, labeled: bool) -> DatasetResult<SceneSample> {
    let mut size: Option<(u32, u32)> = None;
    let mut views = Vec::new();
    for name in CAMERA_NAMES {
        let path = index.dir.join(name);
        let img = open_rgb(&path)?;
        let dims = img.dimensions();
        match size {
            None => {
                size = Some(dims);
                views.reserve(CAMERA_NAMES.len() * 3 * (dims.0 * dims.1) as usize);
            }
            Some(expected) if expected != dims => {
                return Err(DatasetError::SizeMismatch {
                    path,
                    expected,
                    actual: dims,
                });
            }
            Some(_) => {}
        }
        // CHW, normalized like a to-tensor transform.
        for c in 0..3 {
            for p in img.pixels() {
                views.push(p[c] as f32 / 255.0);
            }
        }
    }
    let (width, height) = size.unwrap_or((0, 0));

    let road_map = if labeled {
        let ego = open_rgb(&index.dir.join(ROAD_MAP_FILE))?;
        Some(road_map_from_ego(&ego))
    } else {
        None
    };

    Ok(SceneSample {
        index: index.clone(),
        views,
        width,
        height,
        road_map,
    })
}

/// Every pixel that is not pure white is road.
pub fn road_map_from_ego(ego: &RgbImage) -> RoadMap {
    let (width, height) = ego.dimensions();
    let cells = ego
        .pixels()
        .map(|p| if p.0 == [255, 255, 255] { 0.0 } else { 1.0 })
        .collect();
    RoadMap {
        cells,
        width,
        height,
    }
}
