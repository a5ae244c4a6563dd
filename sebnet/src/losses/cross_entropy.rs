//! Per-pixel cross-entropy for semantic segmentation.

use burn::{
    prelude::*,
    tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData},
};

/// Class-frequency weights for the 19 Cityscapes training classes, as
/// used by the reference training recipe.
pub const CITYSCAPES_CLASS_WEIGHTS: [f32; 19] = [
    0.8373, 0.918, 0.866, 1.0345, 1.0166, 0.9969, 0.9754, 1.0489, 0.8786, 1.0023, 0.9539, 0.9843,
    1.1116, 0.9037, 1.0865, 1.0955, 1.0865, 1.1529, 1.0507,
];

/// Configuration for the segmentation cross-entropy loss.
#[derive(Config, Debug)]
pub struct SegCrossEntropyLossConfig {
    /// Per-class rescaling weights, indexed by class id.
    pub class_weights: Option<Vec<f32>>,
    /// Label value excluded from the loss.
    #[config(default = 255)]
    pub ignore_index: usize,
}

/// Per-pixel cross-entropy over dense class logits.
///
/// Pixels labelled with the ignore index contribute neither to the loss
/// nor to the normalization term, so sparsely annotated targets are
/// handled without bias. The reduction is a weighted mean over the
/// remaining pixels.
#[derive(Module, Debug)]
pub struct SegCrossEntropyLoss<B: Backend> {
    pub class_weights: Option<Vec<f32>>,
    pub ignore_index: usize,
    _phantom: std::marker::PhantomData<B>,
}

impl SegCrossEntropyLossConfig {
    /// Initialize a new segmentation cross-entropy loss with the given
    /// configuration.
    pub fn init<B: Backend>(&self) -> SegCrossEntropyLoss<B> {
        SegCrossEntropyLoss {
            class_weights: self.class_weights.clone(),
            ignore_index: self.ignore_index,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Default for SegCrossEntropyLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SegCrossEntropyLoss<B> {
    /// Create a new segmentation cross-entropy loss with default
    /// configuration.
    pub fn new() -> Self {
        SegCrossEntropyLossConfig::new().init()
    }

    /// Calculate the per-pixel cross-entropy.
    ///
    /// # Arguments
    /// * `logits` - Class logits with shape `[N, K, H, W]`
    /// * `targets` - Label map with shape `[N, H, W]`
    ///
    /// # Returns
    /// The weighted mean loss over the non-ignored pixels. A batch with
    /// no valid pixel yields zero, not NaN.
    pub fn forward(&self, logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        let [batch, num_classes, height, width] = logits.dims();
        let device = logits.device();

        let valid = targets
            .clone()
            .not_equal_elem(self.ignore_index as i32)
            .float();
        // Ignored labels lie outside [0, K), clamp before the gather and
        // let the zero weight cancel their contribution.
        let clamped = targets.clamp(0, (num_classes - 1) as i32);

        let log_probs = log_softmax(logits, 1);
        let picked = log_probs
            .gather(1, clamped.clone().unsqueeze_dim(1))
            .reshape([batch, height, width]);

        let pixel_weights = match &self.class_weights {
            Some(weights) => {
                let table = Tensor::<B, 1>::from_data(
                    TensorData::new(weights.clone(), [weights.len()]),
                    &device,
                );
                let per_pixel = table
                    .gather(0, clamped.reshape([batch * height * width]))
                    .reshape([batch, height, width]);
                per_pixel * valid
            }
            None => valid,
        };

        let total = (-picked * pixel_weights.clone()).sum();
        let norm = pixel_weights.sum().clamp_min(1e-8);

        total / norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    #[test]
    fn uniform_logits_give_log_k() {
        let device = Default::default();
        let loss = SegCrossEntropyLoss::<TestBackend>::new();

        let logits = Tensor::zeros([1, 4, 2, 2], &device);
        let targets = Tensor::from_data(TensorData::new(vec![0_i32, 1, 2, 3], [1, 2, 2]), &device);

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!((value - 4.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn ignored_pixels_are_excluded() {
        let device = Default::default();
        let loss = SegCrossEntropyLoss::<TestBackend>::new();

        // Class 0 is strongly favoured: pixels labelled 0 are nearly
        // free, pixels labelled 1 are expensive.
        let logits = Tensor::from_data(
            TensorData::new(vec![2.0_f32, 2.0, 0.0, 0.0], [1, 2, 1, 2]),
            &device,
        );
        let all_wrong = Tensor::from_data(TensorData::new(vec![1_i32, 1], [1, 1, 2]), &device);
        let half_ignored = Tensor::from_data(TensorData::new(vec![1_i32, 255], [1, 1, 2]), &device);

        let wrong = loss
            .forward(logits.clone(), all_wrong)
            .into_scalar()
            .elem::<f32>();
        let masked = loss
            .forward(logits, half_ignored)
            .into_scalar()
            .elem::<f32>();

        let expected = (1.0_f32 + 2.0_f32.exp()).ln();
        assert!((wrong - expected).abs() < 1e-5);
        assert!((masked - expected).abs() < 1e-5);
    }

    #[test]
    fn all_ignored_batch_yields_zero() {
        let device = Default::default();
        let loss = SegCrossEntropyLoss::<TestBackend>::new();

        let logits = Tensor::random(
            [2, 3, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let targets = Tensor::full([2, 4, 4], 255, &device);

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn class_weights_rescale_pixels() {
        let device = Default::default();
        let loss = SegCrossEntropyLossConfig::new()
            .with_class_weights(Some(vec![3.0, 1.0]))
            .init::<TestBackend>();

        // Same logits on both pixels, one labelled 0 and one labelled 1.
        let logits = Tensor::from_data(
            TensorData::new(vec![2.0_f32, 2.0, 0.0, 0.0], [1, 2, 1, 2]),
            &device,
        );
        let targets = Tensor::from_data(TensorData::new(vec![0_i32, 1], [1, 1, 2]), &device);

        let nll_0 = (1.0_f32 + (-2.0_f32).exp()).ln();
        let nll_1 = (1.0_f32 + 2.0_f32.exp()).ln();
        let expected = (3.0 * nll_0 + nll_1) / 4.0;

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!((value - expected).abs() < 1e-5);
    }
}
