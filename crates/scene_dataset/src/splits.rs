//! Train/validation splits at scene granularity.
//!
//! Consecutive frames of one scene are nearly identical; splitting at frame level would leak
//! validation content into training, so whole scenes are assigned to one side.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Shuffle `scenes` and put `round(train_fraction * n)` of them in the training side.
pub fn split_scenes<R: Rng + ?Sized>(
    scenes: impl IntoIterator<Item = usize>,
    train_fraction: f32,
    rng: &mut R,
) -> SceneSplit {
    let scenes: Vec<usize> = scenes.into_iter().collect();
    let train_count = (train_fraction.clamp(0.0, 1.0) * scenes.len() as f32).round() as usize;
    split_scenes_at(scenes, train_count, rng)
}

/// Shuffle `scenes` and put the first `train_count` of them in the training side.
pub fn split_scenes_at<R: Rng + ?Sized>(
    scenes: impl IntoIterator<Item = usize>,
    train_count: usize,
    rng: &mut R,
) -> SceneSplit {
    let mut scenes: Vec<usize> = scenes.into_iter().collect();
    scenes.shuffle(rng);
    let train_count = train_count.min(scenes.len());
    let valid = scenes.split_off(train_count);
    SceneSplit {
        train: scenes,
        valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LABELED_SCENES, UNLABELED_SCENES};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    #[test]
    fn unlabeled_split_is_eighty_twenty() {
        let mut rng = StdRng::seed_from_u64(20200505);
        let split = split_scenes(UNLABELED_SCENES, 0.8, &mut rng);
        assert_eq!(split.train.len(), 85);
        assert_eq!(split.valid.len(), 21);
    }

    #[test]
    fn split_is_disjoint_and_complete() {
        let mut rng = StdRng::seed_from_u64(7);
        let split = split_scenes(LABELED_SCENES, 0.8, &mut rng);
        assert_eq!(split.train.len(), 22);
        let train: BTreeSet<_> = split.train.iter().copied().collect();
        let valid: BTreeSet<_> = split.valid.iter().copied().collect();
        assert!(train.is_disjoint(&valid));
        let all: BTreeSet<_> = train.union(&valid).copied().collect();
        assert_eq!(all, LABELED_SCENES.collect());
    }

    #[test]
    fn same_seed_same_split() {
        let a = split_scenes(0..40, 0.8, &mut StdRng::seed_from_u64(1));
        let b = split_scenes(0..40, 0.8, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn fixed_count_caps_at_scene_total() {
        let split = split_scenes_at(0..5, 24, &mut StdRng::seed_from_u64(0));
        assert_eq!(split.train.len(), 5);
        assert!(split.valid.is_empty());
    }
}
