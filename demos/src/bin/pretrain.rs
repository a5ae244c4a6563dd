//! SEBNet Classification Pretraining
//!
//! This binary pretrains the SEBNet trunk on a classification dataset
//! before segmentation fine-tuning. The optimizer follows the ImageNet
//! recipe of the original trunk: SGD with momentum and weight decay.
//!
//! The dataset layout is one sub-directory per class, each holding the
//! images of that class.
//!
//! ## Usage
//!
//! ```bash
//! # Pretrain with default configuration
//! cargo run --bin pretrain
//!
//! # Pretrain with a specific configuration file
//! cargo run --bin pretrain -- --config pretrain_config.json
//!
//! # Pretrain the large trunk
//! cargo run --bin pretrain -- --variant l
//! ```

use anyhow::{bail, ensure, Context, Result};
use burn::{
    backend::Autodiff,
    data::dataloader::{DataLoader, DataLoaderBuilder, Dataset},
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, SgdConfig},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    train::{
        metric::{AccuracyMetric, LossMetric},
        LearnerBuilder,
    },
};
use clap::Parser;
use sebnet_burn::{
    ClsBatch, ClsBatcher, ClsDataset, ModelConfig, SebNetClassifier, SebNetClassifierConfig,
};
use sebnet_demos::{
    create_device, get_backend_name, parse_variant, PretrainConfig, SelectedBackend,
    SelectedDevice,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trunk variant to pretrain (s, m, or l)
    #[arg(long)]
    variant: Option<String>,

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
        serde_json::from_str::<PretrainConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        PretrainConfig::default()
    };

    // Apply command line overrides
    if let Some(variant) = &args.variant {
        let variant = parse_variant(variant)?;
        config.backbone = ModelConfig::from_variant(&variant).backbone;
    }
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
    ensure!(config.image_size > 0, "Image size must be greater than 0");

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
        num_classes = config.num_classes,
        batch_size = config.batch_size,
        num_epochs = config.num_epochs,
        learning_rate = config.learning_rate,
        train_dataset = %config.train_dataset_path.display(),
        val_dataset = %config.val_dataset_path.display(),
        checkpoints = %config.checkpoint_path.display(),
        "starting classification pretraining"
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

    ensure!(
        train_dataset.num_classes() == config.num_classes,
        "Training dataset has {} classes but the configuration expects {}",
        train_dataset.num_classes(),
        config.num_classes
    );

    // Create data loaders
    let (train_dataloader, valid_dataloader) =
        create_dataloaders(&config, train_dataset, valid_dataset);

    // Create learner with the SGD recipe and accuracy/loss metrics
    let optimizer_config = SgdConfig::new()
        .with_momentum(Some(MomentumConfig::new()))
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)));

    let learner = LearnerBuilder::new(&config.checkpoint_path)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .build(model, optimizer_config.init(), config.learning_rate);

    // Start training
    tracing::info!("starting pretraining");
    let model_trained = learner.fit(train_dataloader, valid_dataloader);

    // Save final model
    save_final_model(&config, model_trained)?;

    tracing::info!("pretraining completed");

    Ok(())
}

/// Creates and initializes the classification model
fn create_model(
    config: &PretrainConfig,
    device: &SelectedDevice,
) -> Result<SebNetClassifier<Autodiff<SelectedBackend>>> {
    let classifier_config = SebNetClassifierConfig::new()
        .with_backbone(config.backbone.clone())
        .with_num_classes(config.num_classes)
        .with_smoothing(config.smoothing);

    let model = classifier_config
        .init::<Autodiff<SelectedBackend>>(device)
        .context("Failed to initialize classifier model")?;

    Ok(model)
}

/// Creates training and validation datasets
fn create_datasets(
    config: &PretrainConfig,
    device: &SelectedDevice,
) -> Result<(
    ClsDataset<Autodiff<SelectedBackend>>,
    ClsDataset<SelectedBackend>,
)> {
    let target_size = (config.image_size, config.image_size);

    let train_dataset = ClsDataset::<Autodiff<SelectedBackend>>::new(
        &config.train_dataset_path,
        target_size,
        device,
    )
    .context("Failed to create training dataset")?;
    tracing::info!(
        samples = train_dataset.len(),
        classes = train_dataset.num_classes(),
        "training dataset loaded"
    );

    let valid_dataset =
        ClsDataset::<SelectedBackend>::new(&config.val_dataset_path, target_size, device)
            .context("Failed to create validation dataset")?;
    tracing::info!(
        samples = valid_dataset.len(),
        classes = valid_dataset.num_classes(),
        "validation dataset loaded"
    );

    Ok((train_dataset, valid_dataset))
}

/// Creates training and validation data loaders
fn create_dataloaders(
    config: &PretrainConfig,
    train_dataset: ClsDataset<Autodiff<SelectedBackend>>,
    valid_dataset: ClsDataset<SelectedBackend>,
) -> (
    Arc<dyn DataLoader<Autodiff<SelectedBackend>, ClsBatch<Autodiff<SelectedBackend>>>>,
    Arc<dyn DataLoader<SelectedBackend, ClsBatch<SelectedBackend>>>,
) {
    let train_dataloader = DataLoaderBuilder::new(ClsBatcher::new())
        .batch_size(config.batch_size)
        .shuffle(42) // Seed for reproducibility
        .num_workers(config.num_workers)
        .build(train_dataset);

    let valid_dataloader = DataLoaderBuilder::new(ClsBatcher::<SelectedBackend>::new())
        .batch_size(config.batch_size)
        .shuffle(42) // Seed for reproducibility
        .num_workers(config.num_workers)
        .build(valid_dataset);

    (train_dataloader, valid_dataloader)
}

/// Saves the final pretrained model
fn save_final_model(
    config: &PretrainConfig,
    model: SebNetClassifier<Autodiff<SelectedBackend>>,
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
