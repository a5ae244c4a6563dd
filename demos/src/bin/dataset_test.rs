//! Segmentation Dataset Testing
//!
//! This binary checks that a segmentation dataset loads cleanly: sample
//! shapes, image value ranges, annotation label ranges, and batch
//! assembly. It is useful for debugging dataset issues before training.
//!
//! ## Usage
//!
//! ```bash
//! # Test dataset loading
//! cargo run --bin dataset_test -- --dataset-path datasets/val
//!
//! # Test a specific number of samples
//! cargo run --bin dataset_test -- --dataset-path datasets/val --num-samples 5
//! ```

use anyhow::{bail, Context, Result};
use burn::{
    data::dataloader::{DataLoaderBuilder, Dataset},
    tensor::{backend::Backend, cast::ToElement, Int, Tensor},
};
use clap::Parser;
use sebnet_burn::{SegBatcher, SegDataset};
use sebnet_demos::{
    create_device, get_backend_name, DatasetTestConfig, SelectedBackend, SelectedDevice,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Annotation value marking pixels excluded from supervision.
const IGNORE_INDEX: i32 = 255;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to dataset directory
    #[arg(long, default_value = "datasets/val")]
    dataset_path: PathBuf,

    /// Number of samples to test
    #[arg(long, default_value = "10")]
    num_samples: usize,

    /// Number of classes annotations are expected to stay within
    #[arg(long, default_value = "19")]
    num_classes: usize,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Batch size for testing
    #[arg(long, default_value = "4")]
    batch_size: usize,

    /// Number of workers for data loading
    #[arg(long, default_value = "2")]
    num_workers: usize,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<DatasetTestConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        DatasetTestConfig::default()
    };

    // Apply command line overrides
    config.dataset_path = args.dataset_path;
    config.num_samples = args.num_samples;
    config.num_classes = args.num_classes;

    // Validate inputs
    if !config.dataset_path.exists() {
        bail!(
            "Dataset path does not exist: {}",
            config.dataset_path.display()
        );
    }

    // Create device
    let device = create_device();
    tracing::info!(backend = get_backend_name(), "selected backend");

    tracing::info!(
        dataset = %config.dataset_path.display(),
        num_samples = config.num_samples,
        "testing dataset loading"
    );

    // Create dataset
    let dataset = create_dataset(&config, &device)?;

    // Test individual samples
    test_individual_samples(&dataset, &config)?;

    // Test data statistics
    test_data_statistics(&dataset, &config)?;

    // Test batch loading
    test_batch_loading(dataset, args.batch_size, args.num_workers)?;

    tracing::info!("dataset testing completed");
    Ok(())
}

/// Creates the dataset
fn create_dataset(
    config: &DatasetTestConfig,
    device: &SelectedDevice,
) -> Result<SegDataset<SelectedBackend>> {
    let dataset = SegDataset::<SelectedBackend>::new(
        &config.dataset_path,
        (config.image_width, config.image_height),
        device,
    )
    .context("Failed to create dataset")?;

    tracing::info!(samples = dataset.len(), "dataset created");
    Ok(dataset)
}

/// Tests individual samples
fn test_individual_samples(
    dataset: &SegDataset<SelectedBackend>,
    config: &DatasetTestConfig,
) -> Result<()> {
    let num_samples = config.num_samples.min(dataset.len());

    for i in 0..num_samples {
        let sample = dataset.get(i).context("Failed to get sample")?;

        let image_dims = sample.image.dims();
        let mask_dims = sample.mask.dims();
        let (img_min, img_max, img_mean) = calculate_tensor_stats(sample.image);
        let (ignored, invalid, total) = calculate_mask_stats(sample.mask, config.num_classes);

        tracing::info!(
            sample = i,
            image_shape = ?image_dims,
            mask_shape = ?mask_dims,
            image_min = img_min,
            image_max = img_max,
            image_mean = img_mean,
            ignored_pixels = ignored,
            "sample loaded"
        );

        if image_dims[0] != 3 {
            tracing::warn!(sample = i, channels = image_dims[0], "expected 3 channels");
        }
        if [image_dims[1], image_dims[2]] != mask_dims {
            tracing::warn!(sample = i, "image and mask dimensions differ");
        }

        // Normalized images should stay within a few standard deviations.
        if img_min < -3.0 || img_max > 3.0 {
            tracing::warn!(sample = i, "image values outside expected range [-3, 3]");
        }

        if invalid > 0 {
            tracing::warn!(
                sample = i,
                invalid,
                total,
                num_classes = config.num_classes,
                "annotation values outside the class range"
            );
        }
    }

    Ok(())
}

/// Tests aggregate data statistics
fn test_data_statistics(
    dataset: &SegDataset<SelectedBackend>,
    config: &DatasetTestConfig,
) -> Result<()> {
    let mut image_stats = StatisticsAccumulator::new();
    let mut ignored_total = 0i64;
    let mut pixel_total = 0i64;

    let num_samples = config.num_samples.min(dataset.len());

    for i in 0..num_samples {
        let sample = dataset.get(i).context("Failed to get sample")?;

        let (img_min, img_max, img_mean) = calculate_tensor_stats(sample.image);
        let (ignored, _, total) = calculate_mask_stats(sample.mask, config.num_classes);

        image_stats.add(img_min, img_max, img_mean);
        ignored_total += ignored;
        pixel_total += total;
    }

    let ignored_fraction = if pixel_total > 0 {
        ignored_total as f64 / pixel_total as f64
    } else {
        0.0
    };

    tracing::info!(
        samples = num_samples,
        image_min = image_stats.min_val,
        image_max = image_stats.max_val,
        image_mean_avg = image_stats.avg_mean(),
        ignored_fraction,
        "aggregate statistics"
    );

    Ok(())
}

/// Tests batch loading
fn test_batch_loading(
    dataset: SegDataset<SelectedBackend>,
    batch_size: usize,
    num_workers: usize,
) -> Result<()> {
    let dataloader = DataLoaderBuilder::new(SegBatcher::<SelectedBackend>::new())
        .batch_size(batch_size)
        .shuffle(42)
        .num_workers(num_workers)
        .build(dataset);

    let mut batch_count = 0;
    let max_batches = 3; // Test first 3 batches

    for batch in dataloader.iter() {
        batch_count += 1;

        let [batch_images, channels, height, width] = batch.images.dims();
        let [batch_masks, mask_height, mask_width] = batch.masks.dims();

        tracing::info!(
            batch = batch_count,
            images_shape = ?[batch_images, channels, height, width],
            masks_shape = ?[batch_masks, mask_height, mask_width],
            "batch assembled"
        );

        if batch_images != batch_masks {
            tracing::warn!(batch = batch_count, "batch size mismatch between images and masks");
        }
        if channels != 3 {
            tracing::warn!(batch = batch_count, channels, "expected 3 channels for images");
        }
        if height != mask_height || width != mask_width {
            tracing::warn!(batch = batch_count, "image and mask resolutions differ");
        }

        if batch_count >= max_batches {
            break;
        }
    }

    tracing::info!(batches = batch_count, "batch loading test completed");
    Ok(())
}

/// Calculates min, max, and mean of a float tensor
fn calculate_tensor_stats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> (f32, f32, f32) {
    let min_val = tensor.clone().min().into_scalar().to_f32();
    let max_val = tensor.clone().max().into_scalar().to_f32();
    let mean_val = tensor.mean().into_scalar().to_f32();

    (min_val, max_val, mean_val)
}

/// Counts ignored and out-of-range annotation values
///
/// Values below `num_classes` are valid labels and 255 is the ignore
/// marker; everything else indicates a broken annotation.
fn calculate_mask_stats<B: Backend>(
    mask: Tensor<B, 2, Int>,
    num_classes: usize,
) -> (i64, i64, i64) {
    let [height, width] = mask.dims();
    let total = (height * width) as i64;

    let ignored = mask
        .clone()
        .equal_elem(IGNORE_INDEX)
        .int()
        .sum()
        .into_scalar()
        .to_i64();
    let in_range = mask
        .lower_elem(num_classes as i32)
        .int()
        .sum()
        .into_scalar()
        .to_i64();

    (ignored, total - ignored - in_range, total)
}

/// Statistics accumulator for aggregating across samples
struct StatisticsAccumulator {
    min_val: f32,
    max_val: f32,
    mean_sum: f32,
    count: usize,
}

impl StatisticsAccumulator {
    const fn new() -> Self {
        Self {
            min_val: f32::INFINITY,
            max_val: f32::NEG_INFINITY,
            mean_sum: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, min: f32, max: f32, mean: f32) {
        self.min_val = self.min_val.min(min);
        self.max_val = self.max_val.max(max);
        self.mean_sum += mean;
        self.count += 1;
    }

    fn avg_mean(&self) -> f32 {
        if self.count > 0 {
            self.mean_sum / self.count as f32
        } else {
            0.0
        }
    }
}
