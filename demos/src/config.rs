//! Configuration for SEBNet demos.
//!
//! This module provides configuration structures for the training,
//! pretraining, inference, and dataset testing binaries. Each structure
//! can be loaded from a JSON file and overridden from the command line.

use std::path::PathBuf;

use anyhow::Result;
use sebnet_burn::{BackboneConfig, ModelConfig, SebNetVariant};
use serde::{Deserialize, Serialize};

/// Parses a model variant name (`s`, `m`, or `l`).
///
/// # Errors
///
/// Fails on any other name.
pub fn parse_variant(value: &str) -> Result<SebNetVariant> {
    match value.to_ascii_lowercase().as_str() {
        "s" => Ok(SebNetVariant::S),
        "m" => Ok(SebNetVariant::M),
        "l" => Ok(SebNetVariant::L),
        other => anyhow::bail!("Unknown model variant: {other} (expected 's', 'm', or 'l')"),
    }
}

/// Configuration for segmentation training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Model configuration.
    pub model: ModelConfig,
    /// Number of training epochs.
    pub num_epochs: usize,
    /// Batch size for training.
    pub batch_size: usize,
    /// Learning rate for optimization.
    pub learning_rate: f64,
    /// Weight decay of the AdamW optimizer.
    pub weight_decay: f32,
    /// Path to the training dataset.
    pub train_dataset_path: PathBuf,
    /// Path to the validation dataset.
    pub val_dataset_path: PathBuf,
    /// Width every sample is resized to.
    pub image_width: u32,
    /// Height every sample is resized to.
    pub image_height: u32,
    /// Path to save model checkpoints.
    pub checkpoint_path: PathBuf,
    /// Number of workers for data loading.
    pub num_workers: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(),
            num_epochs: 100,
            batch_size: 4,
            learning_rate: 1e-4,
            weight_decay: 1e-2,
            train_dataset_path: PathBuf::from("datasets/train"),
            val_dataset_path: PathBuf::from("datasets/val"),
            image_width: 1024,
            image_height: 1024,
            checkpoint_path: PathBuf::from("checkpoints"),
            num_workers: 4,
        }
    }
}

/// Configuration for classification pretraining.
///
/// Defaults follow the ImageNet recipe of the original trunk: SGD with
/// momentum 0.9, weight decay 1e-4, and 224x224 crops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainConfig {
    /// Trunk configuration to pretrain.
    pub backbone: BackboneConfig,
    /// Number of target classes.
    pub num_classes: usize,
    /// Number of training epochs.
    pub num_epochs: usize,
    /// Batch size for training.
    pub batch_size: usize,
    /// Learning rate for optimization.
    pub learning_rate: f64,
    /// Weight decay of the SGD optimizer.
    pub weight_decay: f32,
    /// Label smoothing of the classification loss.
    pub smoothing: Option<f32>,
    /// Side length every sample is resized to.
    pub image_size: u32,
    /// Path to the training dataset.
    pub train_dataset_path: PathBuf,
    /// Path to the validation dataset.
    pub val_dataset_path: PathBuf,
    /// Path to save model checkpoints.
    pub checkpoint_path: PathBuf,
    /// Number of workers for data loading.
    pub num_workers: usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneConfig::new(),
            num_classes: 1000,
            num_epochs: 100,
            batch_size: 32,
            learning_rate: 0.1,
            weight_decay: 1e-4,
            smoothing: None,
            image_size: 224,
            train_dataset_path: PathBuf::from("datasets/imagenet/train"),
            val_dataset_path: PathBuf::from("datasets/imagenet/val"),
            checkpoint_path: PathBuf::from("checkpoints/pretrain"),
            num_workers: 4,
        }
    }
}

/// Configuration for segmentation inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model configuration, must match the checkpoint architecture.
    pub model: ModelConfig,
    /// Width input images are resized to before the forward pass.
    pub image_width: u32,
    /// Height input images are resized to before the forward pass.
    pub image_height: u32,
    /// Output directory for results.
    pub output_path: PathBuf,
    /// Whether to also save the raw class-index map next to the color map.
    pub save_class_ids: bool,
    /// Whether to resize predictions back to the original resolution.
    pub preserve_original_resolution: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(),
            image_width: 2048,
            image_height: 1024,
            output_path: PathBuf::from("outputs"),
            save_class_ids: false,
            preserve_original_resolution: false,
        }
    }
}

/// Configuration for dataset testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetTestConfig {
    /// Path to the dataset.
    pub dataset_path: PathBuf,
    /// Number of samples to test.
    pub num_samples: usize,
    /// Number of classes annotations are expected to stay within.
    pub num_classes: usize,
    /// Width every sample is resized to.
    pub image_width: u32,
    /// Height every sample is resized to.
    pub image_height: u32,
}

impl Default for DatasetTestConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("datasets/val"),
            num_samples: 10,
            num_classes: 19,
            image_width: 1024,
            image_height: 1024,
        }
    }
}
