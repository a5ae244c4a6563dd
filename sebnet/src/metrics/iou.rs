//! Mean intersection-over-union metric for semantic segmentation.

use burn::{
    prelude::*,
    tensor::{backend::Backend, ElementConversion, Int, Tensor},
    train::metric::{Metric, MetricEntry, MetricMetadata, Numeric},
};
use std::marker::PhantomData;

use crate::metrics::input::SegIoUInput;

// --- Mean IoU Metric ---

#[derive(Config, Debug)]
pub struct SegIoUMetricConfig {
    /// Number of classes to track.
    pub num_classes: usize,
    /// Label value excluded from both predictions and targets.
    #[config(default = 255)]
    pub ignore_index: usize,
}

/// Running mean IoU over all classes seen so far.
///
/// Predictions are taken as the per-pixel argmax of the logits.
/// Intersections and unions accumulate per class across batches, and
/// the reported value averages the per-class IoU over the classes that
/// appeared at least once, so an epoch value matches a whole-dataset
/// evaluation rather than a mean of batch scores.
#[derive(Debug, Clone)]
pub struct SegIoUMetric<B: Backend> {
    state: SegIoUState,
    num_classes: usize,
    ignore_index: usize,
    _b: PhantomData<B>,
}

#[derive(Debug, Clone, Default)]
struct SegIoUState {
    intersections: Vec<f64>,
    unions: Vec<f64>,
}

impl SegIoUMetricConfig {
    pub fn init<B: Backend>(&self) -> SegIoUMetric<B> {
        SegIoUMetric {
            state: SegIoUState {
                intersections: vec![0.0; self.num_classes],
                unions: vec![0.0; self.num_classes],
            },
            num_classes: self.num_classes,
            ignore_index: self.ignore_index,
            _b: PhantomData,
        }
    }
}

impl<B: Backend> SegIoUMetric<B> {
    /// Create a new mean-IoU metric for the given number of classes.
    pub fn new(num_classes: usize) -> Self {
        SegIoUMetricConfig::new(num_classes).init()
    }

    fn update_stats(&mut self, predictions: Tensor<B, 4>, targets: Tensor<B, 3, Int>) {
        let [batch, _, height, width] = predictions.dims();

        let predicted = predictions.argmax(1).reshape([batch, height, width]);
        let valid = targets
            .clone()
            .not_equal_elem(self.ignore_index as i32)
            .float();

        for class in 0..self.num_classes {
            let predicted_class =
                predicted.clone().equal_elem(class as i32).float() * valid.clone();
            let target_class = targets.clone().equal_elem(class as i32).float() * valid.clone();

            let intersection = (predicted_class.clone() * target_class.clone())
                .sum()
                .into_scalar()
                .elem::<f32>();
            let union = (predicted_class.sum() + target_class.sum())
                .into_scalar()
                .elem::<f32>()
                - intersection;

            self.state.intersections[class] += f64::from(intersection);
            self.state.unions[class] += f64::from(union);
        }
    }

    fn mean_iou(&self) -> f64 {
        let mut sum = 0.0;
        let mut present = 0usize;

        for class in 0..self.num_classes {
            let union = self.state.unions[class];
            if union > 0.0 {
                sum += self.state.intersections[class] / union;
                present += 1;
            }
        }

        if present == 0 {
            0.0
        } else {
            sum / present as f64
        }
    }
}

impl<B: Backend> Metric for SegIoUMetric<B> {
    type Input = SegIoUInput<B>;

    fn name(&self) -> String {
        "Mean IoU".to_string()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.update_stats(item.predictions.clone(), item.targets.clone());
        let value = self.mean_iou();
        MetricEntry::new(self.name(), format!("{value:.5}"), format!("{value:.5}"))
    }

    fn clear(&mut self) {
        self.state = SegIoUState {
            intersections: vec![0.0; self.num_classes],
            unions: vec![0.0; self.num_classes],
        };
    }
}

impl<B: Backend> Numeric for SegIoUMetric<B> {
    fn value(&self) -> f64 {
        self.mean_iou()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn::backend::NdArray<f32>;

    // `MetricMetadata::fake()` is `#[cfg(test)]` inside burn-train and
    // not visible here, so build the same placeholder by hand.
    fn fake_metadata() -> MetricMetadata {
        MetricMetadata {
            progress: burn::data::dataloader::Progress {
                items_processed: 1,
                items_total: 1,
            },
            epoch: 0,
            epoch_total: 1,
            iteration: 0,
            lr: None,
        }
    }

    fn logits_for(labels: &[i32], num_classes: usize, size: usize) -> Tensor<TestBackend, 4> {
        // One-hot logits so the argmax reproduces `labels` exactly.
        let mut values = vec![0.0_f32; num_classes * size * size];
        for (pixel, &label) in labels.iter().enumerate() {
            values[label as usize * size * size + pixel] = 5.0;
        }
        Tensor::from_data(
            TensorData::new(values, [1, num_classes, size, size]),
            &Default::default(),
        )
    }

    #[test]
    fn perfect_prediction_scores_one() {
        let labels = vec![0, 0, 1, 1];
        let predictions = logits_for(&labels, 2, 2);
        let targets = Tensor::from_data(TensorData::new(labels, [1, 2, 2]), &Default::default());

        let mut metric = SegIoUMetric::<TestBackend>::new(2);
        metric.update(
            &SegIoUInput::new(predictions, targets),
            &fake_metadata(),
        );

        assert!((metric.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_prediction_scores_zero() {
        let predictions = logits_for(&[0, 0, 0, 0], 2, 2);
        let targets = Tensor::from_data(
            TensorData::new(vec![1, 1, 1, 1], [1, 2, 2]),
            &Default::default(),
        );

        let mut metric = SegIoUMetric::<TestBackend>::new(2);
        metric.update(
            &SegIoUInput::new(predictions, targets),
            &fake_metadata(),
        );

        assert!(metric.value().abs() < 1e-9);
    }

    #[test]
    fn ignored_pixels_do_not_count() {
        // Prediction says class 0 everywhere; targets agree on two
        // pixels and ignore the other two.
        let predictions = logits_for(&[0, 0, 0, 0], 2, 2);
        let targets = Tensor::from_data(
            TensorData::new(vec![0, 0, 255, 255], [1, 2, 2]),
            &Default::default(),
        );

        let mut metric = SegIoUMetric::<TestBackend>::new(2);
        metric.update(
            &SegIoUInput::new(predictions, targets),
            &fake_metadata(),
        );

        assert!((metric.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn accumulates_across_batches() {
        // Batch 1: half of class 0 predicted right, batch 2: the rest.
        let mut metric = SegIoUMetric::<TestBackend>::new(2);

        let predictions = logits_for(&[0, 0, 1, 1], 2, 2);
        let targets = Tensor::from_data(
            TensorData::new(vec![0, 0, 0, 0], [1, 2, 2]),
            &Default::default(),
        );
        metric.update(
            &SegIoUInput::new(predictions, targets),
            &fake_metadata(),
        );

        let predictions = logits_for(&[0, 0, 0, 0], 2, 2);
        let targets = Tensor::from_data(
            TensorData::new(vec![0, 0, 0, 0], [1, 2, 2]),
            &Default::default(),
        );
        metric.update(
            &SegIoUInput::new(predictions, targets),
            &fake_metadata(),
        );

        // Class 0: intersection 6, union 8. Class 1: intersection 0,
        // union 2. Mean IoU = (0.75 + 0.0) / 2.
        assert!((metric.value() - 0.375).abs() < 1e-9);
        metric.clear();
        assert_eq!(metric.value(), 0.0);
    }
}
