//! Training glue for SEBNet.
//!
//! Defines the output item shared by the train and validation steps and
//! adapts it to the metric inputs, so the model plugs into Burn's
//! `Learner` without further wiring.

use crate::metrics::{SebNetLossInput, SegIoUInput};
use burn::{
    prelude::*,
    tensor::{backend::Backend, Transaction},
    train::metric::{Adaptor, ItemLazy},
};

/// Output of one SEBNet training or validation step.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// The combined multi-head loss.
    pub loss: Tensor<B, 1>,
    /// Main segmentation logits at input resolution.
    pub logits: Tensor<B, 4>,
    /// The label map the batch was scored against.
    pub targets: Tensor<B, 3, Int>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        let transaction_result = Transaction::default()
            .register(self.loss)
            .register(self.logits)
            .register(self.targets)
            .execute();

        let [loss, logits, targets] = transaction_result.try_into().unwrap_or_else(|_| {
            panic!(
                "Failed to extract exactly 3 tensors from transaction. \
                     Expected: [loss, logits, targets]. This indicates a programming \
                     error in SegmentationOutput::sync."
            )
        });

        let device = &Default::default();

        Self {
            loss: Tensor::from_data(loss, device),
            logits: Tensor::from_data(logits, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

impl<B: Backend> Adaptor<SegIoUInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> SegIoUInput<B> {
        SegIoUInput {
            predictions: self.logits.clone(),
            targets: self.targets.clone(),
        }
    }
}

impl<B: Backend> Adaptor<SebNetLossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> SebNetLossInput<B> {
        SebNetLossInput {
            loss: self.loss.clone(),
            batch_size: self.logits.dims()[0],
        }
    }
}
