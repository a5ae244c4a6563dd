//! SEBNet Demos
//!
//! This crate provides demo applications for the SEBNet model family,
//! including segmentation training, classification pretraining,
//! inference, and dataset testing.
//!
//! ## Available Demos
//!
//! - `train`: Segmentation training pipeline with loss and IoU metrics
//! - `pretrain`: ImageNet-style classification pretraining of the trunk
//! - `inference`: Segmentation inference producing color-mapped maps
//! - `dataset_test`: Dataset loading and statistics utilities
//!
//! ## Usage
//!
//! ```bash
//! # Train a segmentation model
//! cargo run --bin train -- --config train_config.json
//!
//! # Pretrain the trunk on a classification dataset
//! cargo run --bin pretrain -- --config pretrain_config.json
//!
//! # Run inference
//! cargo run --bin inference -- model.mpk image.png
//!
//! # Test dataset loading
//! cargo run --bin dataset_test -- --dataset-path datasets/val
//! ```

pub mod common;
pub mod config;

// Re-export commonly used items
pub use common::{
    create_device, get_backend_name, ImageUtils, SelectedBackend, SelectedDevice,
    CITYSCAPES_PALETTE,
};
pub use config::{
    parse_variant, DatasetTestConfig, InferenceConfig, PretrainConfig, TrainingConfig,
};
