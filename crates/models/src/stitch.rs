//! Wide-stitch transform shared by every pipeline.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::ShapeError;

/// Camera views per scene frame.
pub const VIEW_COUNT: usize = 6;

/// Disk order is FL, F, FR, BL, B, BR; this permutation yields FL, F, FR, BR, B, BL,
/// which reads as one continuous 180 degree sweep left to right.
pub const VIEW_ORDER: [usize; VIEW_COUNT] = [0, 1, 2, 5, 4, 3];

/// Reorder the six views of each sample and concatenate them along the width axis.
///
/// Input shape is `[batch, 6, channels, height, width]`, output is
/// `[batch, channels, height, 6 * width]`.
pub fn wide_stitch<B: Backend>(views: Tensor<B, 5>) -> Result<Tensor<B, 4>, ShapeError> {
    let [batch, count, channels, height, width] = views.dims();
    if count != VIEW_COUNT {
        return Err(ShapeError::ViewCount {
            expected: VIEW_COUNT,
            actual: count,
        });
    }
    let order: Vec<i64> = VIEW_ORDER.iter().map(|&i| i as i64).collect();
    let order = Tensor::<B, 1, Int>::from_data(TensorData::new(order, [VIEW_COUNT]), &views.device());

    Ok(views
        .select(1, order)
        .permute([0, 2, 3, 1, 4])
        .reshape([batch, channels, height, VIEW_COUNT * width]))
}
