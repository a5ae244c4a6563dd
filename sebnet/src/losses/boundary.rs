//! Boundary supervision: target extraction and balanced BCE.
//!
//! Boundary ground truth is not stored with the dataset; it is derived
//! on the fly from the segmentation label map. A pixel is a boundary
//! pixel when one of its 4-neighbours carries a different label and
//! both pixels are validly labelled. The loss is a class-balanced
//! binary cross-entropy, since boundary pixels are a small minority of
//! every image.

use burn::{
    prelude::*,
    tensor::{backend::Backend, Int, Tensor},
};

/// Class-balanced binary cross-entropy with logits.
///
/// With β the fraction of negative pixels in the target, positives are
/// weighted by β and negatives by 1−β, following the boundary detection
/// literature. The logits formulation
/// `max(x, 0) - x*y + log(1 + exp(-|x|))` keeps the term finite for
/// large logits of either sign.
#[derive(Module, Debug)]
pub struct BoundaryBceLoss<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> Default for BoundaryBceLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> BoundaryBceLoss<B> {
    /// Create a new balanced boundary loss.
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }

    /// Calculate the balanced BCE between boundary logits and binary
    /// boundary targets of the same shape.
    ///
    /// A target without a single positive pixel zeroes every weight and
    /// therefore the loss; an image without boundaries is not an error.
    pub fn forward(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let total = targets.shape().num_elements() as f32;

        let beta = (targets.clone().sum().neg().add_scalar(total) / total).reshape([1, 1, 1, 1]);
        let weights = targets.clone() * beta.clone()
            + (targets.clone().neg().add_scalar(1.0)) * (beta.neg().add_scalar(1.0));

        let bce = logits.clone().clamp_min(0.0) - logits.clone() * targets
            + (-logits.abs()).exp().add_scalar(1.0).log();

        (weights * bce).mean()
    }
}

/// Derives a binary boundary map from a segmentation label map.
///
/// A pixel is marked when a 4-neighbour disagrees with it; comparisons
/// against pixels labelled `ignore_index` are skipped, so ignored
/// regions never produce positives on either side.
///
/// # Arguments
/// * `labels` - Label map with shape `[N, H, W]`
/// * `ignore_index` - Label value excluded from all comparisons
///
/// # Returns
/// A float tensor of zeros and ones with shape `[N, 1, H, W]`.
pub fn boundary_targets<B: Backend>(
    labels: Tensor<B, 3, Int>,
    ignore_index: usize,
) -> Tensor<B, 4> {
    let [batch, height, width] = labels.dims();
    let device = labels.device();

    let valid = labels
        .clone()
        .not_equal_elem(ignore_index as i32)
        .float();
    let mut hits = Tensor::<B, 3>::zeros([batch, height, width], &device);

    if height > 1 {
        let upper = [0..batch, 0..height - 1, 0..width];
        let lower = [0..batch, 1..height, 0..width];

        let disagree = labels
            .clone()
            .slice(upper.clone())
            .not_equal(labels.clone().slice(lower.clone()))
            .float()
            * valid.clone().slice(upper.clone())
            * valid.clone().slice(lower.clone());

        let marked = hits.clone().slice(upper.clone()) + disagree.clone();
        hits = hits.slice_assign(upper, marked);
        let marked = hits.clone().slice(lower.clone()) + disagree;
        hits = hits.slice_assign(lower, marked);
    }

    if width > 1 {
        let left = [0..batch, 0..height, 0..width - 1];
        let right = [0..batch, 0..height, 1..width];

        let disagree = labels
            .clone()
            .slice(left.clone())
            .not_equal(labels.slice(right.clone()))
            .float()
            * valid.clone().slice(left.clone())
            * valid.slice(right.clone());

        let marked = hits.clone().slice(left.clone()) + disagree.clone();
        hits = hits.slice_assign(left, marked);
        let marked = hits.clone().slice(right.clone()) + disagree;
        hits = hits.slice_assign(right, marked);
    }

    hits.greater_elem(0.0).float().unsqueeze_dim(1)
}

/// Derives per-class boundary maps from a segmentation label map.
///
/// Channel `k` marks the boundary pixels whose own label is `k`, so a
/// two-class edge produces positives in both channels, one per side.
///
/// # Arguments
/// * `labels` - Label map with shape `[N, H, W]`
/// * `num_classes` - Number of output channels
/// * `ignore_index` - Label value excluded from all comparisons
///
/// # Returns
/// A float tensor of zeros and ones with shape `[N, K, H, W]`.
pub fn class_boundary_targets<B: Backend>(
    labels: Tensor<B, 3, Int>,
    num_classes: usize,
    ignore_index: usize,
) -> Tensor<B, 4> {
    let boundary = boundary_targets(labels.clone(), ignore_index);

    let mut channels = Vec::with_capacity(num_classes);
    for class in 0..num_classes {
        channels.push(labels.clone().equal_elem(class as i32).float());
    }

    Tensor::stack(channels, 1) * boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::ElementConversion, tensor::TensorData};

    type TestBackend = NdArray<f32>;

    fn label_map(values: Vec<i32>, height: usize, width: usize) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(TensorData::new(values, [1, height, width]), &Default::default())
    }

    #[test]
    fn boundary_targets_mark_both_sides() {
        let labels = label_map(vec![0, 0, 1, 0, 0, 1, 2, 2, 1], 3, 3);

        let boundary = boundary_targets(labels, 255);
        assert_eq!(boundary.dims(), [1, 1, 3, 3]);

        let values = boundary.into_data().to_vec::<f32>().unwrap();
        // Only the top-left pixel agrees with all of its neighbours.
        assert_eq!(values[0], 0.0);
        assert_eq!(values.iter().sum::<f32>(), 8.0);
    }

    #[test]
    fn ignored_pixels_never_produce_positives() {
        let labels = label_map(vec![0, 0, 1, 0, 255, 1, 2, 2, 1], 3, 3);

        let values = boundary_targets(labels, 255)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        // The ignored centre is never marked and pixel (1, 2), whose only
        // disagreeing neighbour was the centre, loses its positive.
        assert_eq!(values[4], 0.0);
        assert_eq!(values[5], 0.0);
        assert_eq!(values.iter().sum::<f32>(), 6.0);
    }

    #[test]
    fn class_boundary_targets_split_by_label() {
        let labels = label_map(vec![0, 0, 1, 0, 0, 1, 2, 2, 1], 3, 3);

        let per_class = class_boundary_targets(labels, 3, 255);
        assert_eq!(per_class.dims(), [1, 3, 3, 3]);

        let sums: Vec<f32> = (0..3)
            .map(|class| {
                per_class
                    .clone()
                    .slice([0..1, class..class + 1, 0..3, 0..3])
                    .sum()
                    .into_scalar()
                    .elem::<f32>()
            })
            .collect();
        assert_eq!(sums, vec![3.0, 3.0, 2.0]);
    }

    #[test]
    fn balanced_bce_on_uniform_logits() {
        let device = Default::default();
        let loss = BoundaryBceLoss::<TestBackend>::new();

        let logits = Tensor::zeros([1, 1, 4, 4], &device);
        let mut targets = vec![0.0_f32; 16];
        targets[..4].fill(1.0);
        let targets = Tensor::from_data(TensorData::new(targets, [1, 1, 4, 4]), &device);

        // Zero logits cost ln 2 per pixel. With p positives and n
        // negatives out of t pixels the weighted mean folds to
        // 2 * p * n / t^2 * ln 2.
        let expected = 2.0 * 4.0 * 12.0 / 256.0 * 2.0_f32.ln();
        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!((value - expected).abs() < 1e-5);
    }

    #[test]
    fn empty_boundary_target_yields_zero() {
        let device = Default::default();
        let loss = BoundaryBceLoss::<TestBackend>::new();

        let logits = Tensor::random(
            [2, 1, 8, 8],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let targets = Tensor::zeros([2, 1, 8, 8], &device);

        let value = loss.forward(logits, targets).into_scalar().elem::<f32>();
        assert!(value.abs() < 1e-6);
    }
}
