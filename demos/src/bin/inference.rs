//! SEBNet Segmentation Inference
//!
//! This binary runs a trained SEBNet model on single images or whole
//! directories and writes color-mapped segmentation maps.
//!
//! ## Usage
//!
//! ```bash
//! # Run inference on a single image
//! cargo run --bin inference -- model.mpk image.png
//!
//! # Run inference on a directory of images
//! cargo run --bin inference -- model.mpk input_dir/ --output output_dir/
//!
//! # Also save the raw class-index map
//! cargo run --bin inference -- model.mpk image.png --save-class-ids
//!
//! # Keep the original image resolution in the outputs
//! cargo run --bin inference -- model.mpk image.png --preserve-original-resolution
//! ```

use anyhow::{bail, ensure, Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use clap::Parser;
use image::imageops::FilterType;
use sebnet_burn::{
    losses::SebNetLossConfig, ModelConfig, SebNet, SebNetConfig, INPUT_ALIGNMENT,
};
use sebnet_demos::{
    create_device, get_backend_name, parse_variant, ImageUtils, InferenceConfig, SelectedBackend,
    SelectedDevice,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the model weights (.mpk)
    model: PathBuf,

    /// Path to the input image or directory
    input: PathBuf,

    /// Output directory for results
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Model variant matching the weights (s, m, or l)
    #[arg(long)]
    variant: Option<String>,

    /// Override processing width
    #[arg(long)]
    width: Option<u32>,

    /// Override processing height
    #[arg(long)]
    height: Option<u32>,

    /// Also save the raw class-index map
    #[arg(long)]
    save_class_ids: bool,

    /// Resize predictions back to the original image resolution
    #[arg(long)]
    preserve_original_resolution: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<InferenceConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        InferenceConfig::default()
    };

    // Apply command line overrides
    if let Some(variant) = &args.variant {
        let variant = parse_variant(variant)?;
        config.model = ModelConfig::from_variant(&variant);
    }
    if let Some(width) = args.width {
        config.image_width = width;
    }
    if let Some(height) = args.height {
        config.image_height = height;
    }
    config.output_path = args.output;
    config.save_class_ids |= args.save_class_ids;
    config.preserve_original_resolution |= args.preserve_original_resolution;

    // Validate inputs
    if !args.model.exists() {
        bail!("Model file does not exist: {}", args.model.display());
    }
    if !args.input.exists() {
        bail!("Input path does not exist: {}", args.input.display());
    }

    let alignment = INPUT_ALIGNMENT as u32;
    ensure!(
        config.image_width % alignment == 0 && config.image_height % alignment == 0,
        "Processing size {}x{} must be divisible by {}",
        config.image_width,
        config.image_height,
        alignment
    );

    // Create output directory
    fs::create_dir_all(&config.output_path).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_path.display()
        )
    })?;

    // Create device
    let device = create_device();
    tracing::info!(backend = get_backend_name(), "selected backend");

    tracing::info!(model = %args.model.display(), "loading model");
    let model = load_model(&args.model, &config, &device)?;

    process_input(&model, &args.input, &config, &device)?;

    tracing::info!("inference completed");
    Ok(())
}

/// Loads the trained model from an MPK record
fn load_model(
    model_path: &Path,
    config: &InferenceConfig,
    device: &SelectedDevice,
) -> Result<SebNet<SelectedBackend>> {
    let model_config = SebNetConfig::new(config.model.clone(), SebNetLossConfig::new());

    let model = model_config
        .init::<SelectedBackend>(device)
        .context("Failed to initialize model")?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(model_path.to_path_buf(), device)
        .context("Failed to load model weights")?;

    Ok(model.load_record(record))
}

/// Unified processing function for both single images and directories
fn process_input(
    model: &SebNet<SelectedBackend>,
    input_path: &Path,
    config: &InferenceConfig,
    device: &SelectedDevice,
) -> Result<()> {
    if input_path.is_file() {
        process_single_image(model, input_path, config, device)
    } else if input_path.is_dir() {
        process_directory(model, input_path, config, device)
    } else {
        bail!("Input must be a file or directory")
    }
}

/// Runs the model on one image and writes the segmentation maps
fn process_single_image(
    model: &SebNet<SelectedBackend>,
    image_path: &Path,
    config: &InferenceConfig,
    device: &SelectedDevice,
) -> Result<()> {
    let start_time = Instant::now();

    let original_dimensions = if config.preserve_original_resolution {
        Some(image::image_dimensions(image_path).with_context(|| {
            format!("Failed to read dimensions of {}", image_path.display())
        })?)
    } else {
        None
    };

    let input = ImageUtils::load_normalized_image::<SelectedBackend, _>(
        image_path,
        (config.image_width, config.image_height),
        device,
    )?;

    let logits = model
        .forward(input)
        .context("Segmentation forward pass failed")?;

    let (ids, width, height) = ImageUtils::logits_to_class_ids(logits)?;

    let stem = image_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let color_image = ImageUtils::class_ids_to_color_image(&ids, width, height)?;
    let color_path = config.output_path.join(format!("{stem}_color.png"));
    match original_dimensions {
        Some((orig_width, orig_height)) => {
            // Nearest neighbour keeps the palette colors exact.
            image::imageops::resize(&color_image, orig_width, orig_height, FilterType::Nearest)
                .save(&color_path)
        }
        None => color_image.save(&color_path),
    }
    .with_context(|| format!("Failed to save color map to {}", color_path.display()))?;

    if config.save_class_ids {
        let ids_image = ImageUtils::class_ids_to_gray_image(&ids, width, height)?;
        let ids_path = config.output_path.join(format!("{stem}_ids.png"));
        match original_dimensions {
            Some((orig_width, orig_height)) => {
                image::imageops::resize(&ids_image, orig_width, orig_height, FilterType::Nearest)
                    .save(&ids_path)
            }
            None => ids_image.save(&ids_path),
        }
        .with_context(|| format!("Failed to save class-index map to {}", ids_path.display()))?;
    }

    tracing::info!(
        image = %image_path.display(),
        seconds = start_time.elapsed().as_secs_f32(),
        output = %color_path.display(),
        "processed image"
    );

    Ok(())
}

/// Runs the model on every image in a directory
fn process_directory(
    model: &SebNet<SelectedBackend>,
    input_dir: &Path,
    config: &InferenceConfig,
    device: &SelectedDevice,
) -> Result<()> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory: {}", input_dir.display()))?;

    let mut image_paths = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        if path.is_file() {
            if let Some(extension) = path.extension() {
                let ext = extension.to_string_lossy().to_lowercase();
                if matches!(ext.as_str(), "jpg" | "jpeg" | "png") {
                    image_paths.push(path);
                }
            }
        }
    }
    image_paths.sort();

    if image_paths.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no image files found in directory");
        return Ok(());
    }

    let total_images = image_paths.len();
    let start_time = Instant::now();
    let mut processed_count = 0usize;

    for path in &image_paths {
        match process_single_image(model, path, config, device) {
            Ok(()) => processed_count += 1,
            Err(e) => tracing::warn!(image = %path.display(), error = %e, "failed to process"),
        }
    }

    tracing::info!(
        processed = processed_count,
        total = total_images,
        seconds = start_time.elapsed().as_secs_f32(),
        "directory processed"
    );

    Ok(())
}
