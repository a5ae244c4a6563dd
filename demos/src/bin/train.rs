//! SEBNet Segmentation Training
//!
//! This binary trains a SEBNet segmentation model with the Burn framework.
//! It wires the multi-head boundary-aware loss and the IoU metric into a
//! complete training pipeline with checkpointing.
//!
//! ## Features
//!
//! Training supports multiple backends through feature flags:
//! - `ndarray`: CPU backend using ndarray (default)
//! - `wgpu`: GPU backend using WGPU
//! - `cuda`: NVIDIA GPU backend using CUDA
//!
//! ## Usage
//!
//! ```bash
//! # Train with default configuration
//! cargo run --bin train
//!
//! # Train with a specific configuration file
//! cargo run --bin train -- --config train_config.json
//!
//! # Train with the WGPU backend
//! cargo run --bin train --features wgpu --no-default-features
//! ```

use anyhow::{bail, ensure, Context, Result};
use burn::{
    backend::Autodiff,
    data::dataloader::{DataLoader, DataLoaderBuilder, Dataset},
    optim::AdamWConfig,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    train::LearnerBuilder,
};
use clap::Parser;
use sebnet_burn::{
    losses::{SebNetLossConfig, CITYSCAPES_CLASS_WEIGHTS},
    metrics::{LossMetric, SegIoUMetric},
    SebNet, SebNetConfig, SegBatch, SegBatcher, SegDataset,
};
use sebnet_demos::{
    create_device, get_backend_name, SelectedBackend, SelectedDevice, TrainingConfig,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override number of epochs
    #[arg(long)]
    num_epochs: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Override training dataset path
    #[arg(long)]
    train_dataset_path: Option<PathBuf>,

    /// Override validation dataset path
    #[arg(long)]
    val_dataset_path: Option<PathBuf>,

    /// Override checkpoint path
    #[arg(long)]
    checkpoint_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<TrainingConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        TrainingConfig::default()
    };

    // Apply command line overrides
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(train_dataset_path) = args.train_dataset_path {
        config.train_dataset_path = train_dataset_path;
    }
    if let Some(val_dataset_path) = args.val_dataset_path {
        config.val_dataset_path = val_dataset_path;
    }
    if let Some(checkpoint_path) = args.checkpoint_path {
        config.checkpoint_path = checkpoint_path;
    }

    // Validate configuration
    ensure!(config.batch_size > 0, "Batch size must be greater than 0");
    ensure!(
        config.num_epochs > 0,
        "Number of epochs must be greater than 0"
    );
    ensure!(config.learning_rate > 0.0, "Learning rate must be positive");

    if !config.train_dataset_path.exists() {
        bail!(
            "Training dataset path does not exist: {}",
            config.train_dataset_path.display()
        );
    }

    if !config.val_dataset_path.exists() {
        bail!(
            "Validation dataset path does not exist: {}",
            config.val_dataset_path.display()
        );
    }

    tracing::info!(
        batch_size = config.batch_size,
        num_epochs = config.num_epochs,
        learning_rate = config.learning_rate,
        train_dataset = %config.train_dataset_path.display(),
        val_dataset = %config.val_dataset_path.display(),
        checkpoints = %config.checkpoint_path.display(),
        "starting segmentation training"
    );

    std::fs::create_dir_all(&config.checkpoint_path).with_context(|| {
        format!(
            "Failed to create checkpoint directory at {}",
            config.checkpoint_path.display()
        )
    })?;

    // Create device
    let device = create_device();
    tracing::info!(backend = get_backend_name(), "selected backend");

    // Create and initialize model
    let model = create_model(&config, &device)?;

    // Create datasets
    let (train_dataset, valid_dataset) = create_datasets(&config, &device)?;

    // Create data loaders
    let (train_dataloader, valid_dataloader) =
        create_dataloaders(&config, train_dataset, valid_dataset);

    // Create learner with optimizer and metrics
    let optimizer_config = AdamWConfig::new().with_weight_decay(config.weight_decay);
    let num_classes = config.model.head.num_classes;

    let learner = LearnerBuilder::new(&config.checkpoint_path)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_valid_numeric(SegIoUMetric::new(num_classes))
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .build(model, optimizer_config.init(), config.learning_rate);

    // Start training
    tracing::info!("starting training");
    let model_trained = learner.fit(train_dataloader, valid_dataloader);

    // Save final model
    save_final_model(&config, model_trained)?;

    tracing::info!("training completed");

    Ok(())
}

/// Creates and initializes the segmentation model
fn create_model(
    config: &TrainingConfig,
    device: &SelectedDevice,
) -> Result<SebNet<Autodiff<SelectedBackend>>> {
    // The published class weights only apply to the 19-class layout.
    let class_weights = (config.model.head.num_classes == CITYSCAPES_CLASS_WEIGHTS.len())
        .then(|| CITYSCAPES_CLASS_WEIGHTS.to_vec());

    let loss_config = SebNetLossConfig::new().with_class_weights(class_weights);
    let model_config = SebNetConfig::new(config.model.clone(), loss_config);

    let model = model_config
        .init::<Autodiff<SelectedBackend>>(device)
        .context("Failed to initialize SEBNet model")?;

    Ok(model)
}

/// Creates training and validation datasets
fn create_datasets(
    config: &TrainingConfig,
    device: &SelectedDevice,
) -> Result<(
    SegDataset<Autodiff<SelectedBackend>>,
    SegDataset<SelectedBackend>,
)> {
    let target_size = (config.image_width, config.image_height);

    let train_dataset = SegDataset::<Autodiff<SelectedBackend>>::new(
        &config.train_dataset_path,
        target_size,
        device,
    )
    .context("Failed to create training dataset")?;
    tracing::info!(samples = train_dataset.len(), "training dataset loaded");

    let valid_dataset =
        SegDataset::<SelectedBackend>::new(&config.val_dataset_path, target_size, device)
            .context("Failed to create validation dataset")?;
    tracing::info!(samples = valid_dataset.len(), "validation dataset loaded");

    Ok((train_dataset, valid_dataset))
}

/// Creates training and validation data loaders
fn create_dataloaders(
    config: &TrainingConfig,
    train_dataset: SegDataset<Autodiff<SelectedBackend>>,
    valid_dataset: SegDataset<SelectedBackend>,
) -> (
    Arc<dyn DataLoader<Autodiff<SelectedBackend>, SegBatch<Autodiff<SelectedBackend>>>>,
    Arc<dyn DataLoader<SelectedBackend, SegBatch<SelectedBackend>>>,
) {
    let train_dataloader = DataLoaderBuilder::new(SegBatcher::new())
        .batch_size(config.batch_size)
        .shuffle(42) // Seed for reproducibility
        .num_workers(config.num_workers)
        .build(train_dataset);

    let valid_dataloader = DataLoaderBuilder::new(SegBatcher::<SelectedBackend>::new())
        .batch_size(config.batch_size)
        .shuffle(42) // Seed for reproducibility
        .num_workers(config.num_workers)
        .build(valid_dataset);

    (train_dataloader, valid_dataloader)
}

/// Saves the final trained model
fn save_final_model(
    config: &TrainingConfig,
    model: SebNet<Autodiff<SelectedBackend>>,
) -> Result<()> {
    let final_model_path = config.checkpoint_path.join("final_model.mpk");

    model
        .save_file::<NamedMpkFileRecorder<FullPrecisionSettings>, &PathBuf>(
            &final_model_path,
            &burn::record::DefaultFileRecorder::new(),
        )
        .with_context(|| {
            format!(
                "Failed to save final model to {}",
                final_model_path.display()
            )
        })?;

    tracing::info!(path = %final_model_path.display(), "saved final model");

    Ok(())
}
