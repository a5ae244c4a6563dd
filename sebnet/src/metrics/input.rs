//! Input structures for SEBNet metrics.
//!
//! Model outputs are adapted into these structs so the metrics never
//! depend on the training step types directly.

use burn::{prelude::*, tensor::backend::Backend};

/// Input of the mean-IoU metric: dense class logits and the label map
/// they were trained against.
pub struct SegIoUInput<B: Backend> {
    pub predictions: Tensor<B, 4>,
    pub targets: Tensor<B, 3, Int>,
}

impl<B: Backend> SegIoUInput<B> {
    pub const fn new(predictions: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Self {
        Self {
            predictions,
            targets,
        }
    }
}

/// Input of the loss metric.
pub struct SebNetLossInput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub batch_size: usize,
}

impl<B: Backend> SebNetLossInput<B> {
    pub const fn new(loss: Tensor<B, 1>, batch_size: usize) -> Self {
        Self { loss, batch_size }
    }
}
