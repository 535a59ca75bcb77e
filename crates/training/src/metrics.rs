//! Losses and the threat-score metric for road-map prediction.

use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::RoadMapLoss;
use crate::util::scalar;

/// Threshold used to round probabilities to a binary map.
pub const ROUND_THRESHOLD: f32 = 0.5;

/// Round probabilities to `{0, 1}` (strictly above the threshold counts as road).
pub fn binarize<B: Backend, const D: usize>(probabilities: Tensor<B, D>) -> Tensor<B, D> {
    probabilities.greater_elem(ROUND_THRESHOLD).float()
}

/// `TP / (|truth| + |pred| - TP)` over all cells of the batch.
///
/// Both inputs are expected to be binary. An empty union (no road anywhere in truth or
/// prediction) counts as a perfect score.
pub fn threat_score<B: Backend, const D: usize>(pred: Tensor<B, D>, truth: Tensor<B, D>) -> f32 {
    let tp = scalar((pred.clone() * truth.clone()).sum());
    let union = scalar(truth.sum()) + scalar(pred.sum()) - tp;
    if union <= 0.0 {
        1.0
    } else {
        tp / union
    }
}

/// Threat score of rounded probabilities against a binary truth map.
pub fn rounded_threat_score<B: Backend, const D: usize>(
    probabilities: Tensor<B, D>,
    truth: Tensor<B, D>,
) -> f32 {
    threat_score(binarize(probabilities), truth)
}

/// Mean binary cross-entropy with probabilities clamped away from 0 and 1.
pub fn bce_loss<B: Backend, const D: usize>(pred: Tensor<B, D>, target: Tensor<B, D>) -> Tensor<B, 1> {
    let eps = 1e-6;
    let count = pred.shape().num_elements() as f32;
    let pred = pred.clamp(eps, 1.0 - eps);
    let target_inv = target.ones_like() - target.clone();
    let pred_inv = pred.ones_like() - pred.clone();
    (-((target * pred.log()) + (target_inv * pred_inv.log())))
        .sum()
        .div_scalar(count)
}

pub fn roadmap_loss<B: Backend, const D: usize>(
    kind: RoadMapLoss,
    pred: Tensor<B, D>,
    truth: Tensor<B, D>,
) -> Tensor<B, 1> {
    match kind {
        RoadMapLoss::Mse => MseLoss::new().forward(pred, truth, Reduction::Mean),
        RoadMapLoss::Bce => bce_loss(pred, truth),
    }
}

/// Running mean of per-batch values; NaN-free when empty.
#[derive(Debug, Clone, Default)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}
