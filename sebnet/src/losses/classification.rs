//! Classification loss for the ImageNet pretraining model.

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
    tensor::{backend::Backend, Int, Tensor},
};

/// Configuration for the classification loss.
#[derive(Config, Debug)]
pub struct ClsLossConfig {
    /// Per-class rescaling weights, indexed by class id.
    pub class_weights: Option<Vec<f32>>,
    /// Label smoothing factor.
    pub smoothing: Option<f32>,
}

/// Cross-entropy over class logits.
///
/// A thin wrapper around Burn's loss that fixes the logits/label
/// calling convention used by the classifier heads.
#[derive(Module, Debug)]
pub struct ClsLoss<B: Backend> {
    pub ce_loss: CrossEntropyLoss<B>,
}

impl ClsLossConfig {
    /// Initialize a new classification loss with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClsLoss<B> {
        ClsLoss {
            ce_loss: CrossEntropyLossConfig::new()
                .with_weights(self.class_weights.clone())
                .with_smoothing(self.smoothing)
                .init(device),
        }
    }
}

impl<B: Backend> ClsLoss<B> {
    /// Create a new classification loss with default configuration.
    pub fn new(device: &B::Device) -> Self {
        ClsLossConfig::new().init(device)
    }

    /// Calculate the cross-entropy between class logits of shape
    /// `[N, K]` and labels of shape `[N]`.
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.ce_loss.forward(logits, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::ElementConversion, tensor::TensorData};

    type TestBackend = NdArray<f32>;

    #[test]
    fn uniform_logits_give_log_k() {
        let device = Default::default();
        let loss = ClsLoss::<TestBackend>::new(&device);

        let logits = Tensor::zeros([2, 10], &device);
        let targets = Tensor::from_data(TensorData::new(vec![3_i32, 7], [2]), &device);

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!((value - 10.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn smoothing_keeps_loss_finite() {
        let device = Default::default();
        let loss = ClsLossConfig::new()
            .with_smoothing(Some(0.1))
            .init::<TestBackend>(&device);

        let logits = Tensor::random(
            [4, 5],
            burn::tensor::Distribution::Normal(0.0, 5.0),
            &device,
        );
        let targets = Tensor::from_data(TensorData::new(vec![0_i32, 1, 2, 3], [4]), &device);

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!(value.is_finite());
    }
}
