//! Dataset implementations for SEBNet training.
//!
//! Two layouts are supported: segmentation datasets with parallel
//! `images/` and `annotations/` directories holding image files and
//! palette-free index PNGs with matching stems, and classification
//! datasets with one sub-directory per class. Loading and preprocessing
//! happen in `Dataset::get`, so the data loader workers carry the
//! decoding cost.

use std::path::{Path, PathBuf};

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use image::{self, imageops::FilterType, DynamicImage};
use walkdir::WalkDir;

use crate::error::{SebNetError, SebNetResult};

/// Channel means of the ImageNet training set, applied to every input
/// image.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Channel standard deviations of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const VALID_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A single preprocessed segmentation sample.
#[derive(Debug, Clone)]
pub struct SegSample<B: Backend> {
    /// Normalized input image with shape `[3, H, W]`.
    pub image: Tensor<B, 3>,
    /// Label map with shape `[H, W]`; 255 marks ignored pixels.
    pub mask: Tensor<B, 2, Int>,
}

/// A batch of segmentation samples.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    /// Batched input images with shape `[N, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// Batched label maps with shape `[N, H, W]`.
    pub masks: Tensor<B, 3, Int>,
}

/// Batcher stacking segmentation samples along the batch dimension.
#[derive(Clone, Default)]
pub struct SegBatcher<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> SegBatcher<B> {
    /// Create a new segmentation batcher.
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegSample<B>, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegSample<B>>, _device: &B::Device) -> SegBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);

        for item in items {
            images.push(item.image);
            masks.push(item.mask);
        }

        SegBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
        }
    }
}

/// Segmentation dataset over an `images/` + `annotations/` directory
/// pair.
pub struct SegDataset<B: Backend> {
    items: Vec<(PathBuf, PathBuf)>,
    device: B::Device,
    target_size: (u32, u32),
}

impl<B: Backend> SegDataset<B> {
    /// Create a new segmentation dataset.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory containing `images/` and `annotations/`
    /// * `target_size` - `(width, height)` every sample is resized to
    /// * `device` - Device to load tensors on
    ///
    /// # Errors
    ///
    /// Returns [`SebNetError::DatasetError`] if either directory is
    /// missing or no image/annotation pair is found.
    pub fn new(
        root: impl AsRef<Path>,
        target_size: (u32, u32),
        device: &B::Device,
    ) -> SebNetResult<Self> {
        let root = root.as_ref();
        let items = Self::collect_pairs(root)?;

        tracing::info!(
            pairs = items.len(),
            root = %root.display(),
            "collected segmentation dataset"
        );

        Ok(Self {
            items,
            device: device.clone(),
            target_size,
        })
    }

    fn collect_pairs(root: &Path) -> SebNetResult<Vec<(PathBuf, PathBuf)>> {
        let image_root = root.join("images");
        let annotation_root = root.join("annotations");

        if !image_root.exists() {
            return Err(SebNetError::DatasetError {
                message: format!("image directory does not exist: {}", image_root.display()),
            });
        }
        if !annotation_root.exists() {
            return Err(SebNetError::DatasetError {
                message: format!(
                    "annotation directory does not exist: {}",
                    annotation_root.display()
                ),
            });
        }

        let mut items = Vec::new();

        for entry in WalkDir::new(&image_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| SebNetError::DatasetError {
                message: format!("failed to read {}: {e}", image_root.display()),
            })?;
            if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
                continue;
            }

            let image_path = entry.into_path();
            let Some(stem) = image_path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let annotation_path = annotation_root.join(format!("{stem}.png"));
            if annotation_path.exists() {
                items.push((image_path, annotation_path));
            } else {
                tracing::warn!(image = %image_path.display(), "no matching annotation");
            }
        }

        if items.is_empty() {
            return Err(SebNetError::DatasetError {
                message: format!(
                    "no image/annotation pairs found under {}",
                    root.display()
                ),
            });
        }

        Ok(items)
    }
}

impl<B: Backend> Dataset<SegSample<B>> for SegDataset<B> {
    fn get(&self, index: usize) -> Option<SegSample<B>> {
        let (image_path, annotation_path) = self.items.get(index)?;

        let image = image::open(image_path).ok()?;
        let mask = image::open(annotation_path).ok()?;

        let (width, height) = self.target_size;
        let image = image.resize_exact(width, height, FilterType::Lanczos3);
        // Labels must survive resizing untouched.
        let mask = mask.resize_exact(width, height, FilterType::Nearest);

        Some(SegSample {
            image: normalize_image(image_to_tensor(image, &self.device), &self.device),
            mask: mask_to_tensor(mask, &self.device),
        })
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A single preprocessed classification sample.
#[derive(Debug, Clone)]
pub struct ClsSample<B: Backend> {
    /// Normalized input image with shape `[3, H, W]`.
    pub image: Tensor<B, 3>,
    /// Class index of the directory the image came from.
    pub label: usize,
}

/// A batch of classification samples.
#[derive(Debug, Clone)]
pub struct ClsBatch<B: Backend> {
    /// Batched input images with shape `[N, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// Class labels with shape `[N]`.
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking classification samples along the batch dimension.
#[derive(Clone, Default)]
pub struct ClsBatcher<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> ClsBatcher<B> {
    /// Create a new classification batcher.
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ClsSample<B>, ClsBatch<B>> for ClsBatcher<B> {
    fn batch(&self, items: Vec<ClsSample<B>>, device: &B::Device) -> ClsBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            images.push(item.image);
            labels.push(item.label as i32);
        }

        ClsBatch {
            images: Tensor::stack(images, 0),
            targets: Tensor::from_data(TensorData::new(labels, [batch_size]), device),
        }
    }
}

/// Classification dataset over a class-per-directory image folder.
pub struct ClsDataset<B: Backend> {
    items: Vec<(PathBuf, usize)>,
    classes: Vec<String>,
    device: B::Device,
    target_size: (u32, u32),
}

impl<B: Backend> ClsDataset<B> {
    /// Create a new classification dataset.
    ///
    /// Class indices follow the lexicographic order of the directory
    /// names, so they are stable across runs and machines.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory containing one sub-directory per class
    /// * `target_size` - `(width, height)` every sample is resized to
    /// * `device` - Device to load tensors on
    ///
    /// # Errors
    ///
    /// Returns [`SebNetError::DatasetError`] if the root is missing, has
    /// no class directories, or contains no images.
    pub fn new(
        root: impl AsRef<Path>,
        target_size: (u32, u32),
        device: &B::Device,
    ) -> SebNetResult<Self> {
        let root = root.as_ref();
        let (classes, items) = Self::collect_classes(root)?;

        tracing::info!(
            samples = items.len(),
            classes = classes.len(),
            root = %root.display(),
            "collected classification dataset"
        );

        Ok(Self {
            items,
            classes,
            device: device.clone(),
            target_size,
        })
    }

    /// Class names in index order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes found in the dataset.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    fn collect_classes(root: &Path) -> SebNetResult<(Vec<String>, Vec<(PathBuf, usize)>)> {
        if !root.exists() {
            return Err(SebNetError::DatasetError {
                message: format!("dataset directory does not exist: {}", root.display()),
            });
        }

        let mut class_dirs = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| SebNetError::DatasetError {
                message: format!("failed to read {}: {e}", root.display()),
            })?;
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                class_dirs.push((name, entry.into_path()));
            }
        }

        if class_dirs.is_empty() {
            return Err(SebNetError::DatasetError {
                message: format!("no class directories found under {}", root.display()),
            });
        }

        let mut items = Vec::new();
        for (label, (_, dir)) in class_dirs.iter().enumerate() {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| SebNetError::DatasetError {
                    message: format!("failed to read {}: {e}", dir.display()),
                })?;
                if entry.file_type().is_file() && has_image_extension(entry.path()) {
                    items.push((entry.into_path(), label));
                }
            }
        }

        if items.is_empty() {
            return Err(SebNetError::DatasetError {
                message: format!("no images found under {}", root.display()),
            });
        }

        let classes = class_dirs.into_iter().map(|(name, _)| name).collect();
        Ok((classes, items))
    }
}

impl<B: Backend> Dataset<ClsSample<B>> for ClsDataset<B> {
    fn get(&self, index: usize) -> Option<ClsSample<B>> {
        let (image_path, label) = self.items.get(index)?;

        let image = image::open(image_path).ok()?;
        let (width, height) = self.target_size;
        let image = image.resize_exact(width, height, FilterType::Lanczos3);

        Some(ClsSample {
            image: normalize_image(image_to_tensor(image, &self.device), &self.device),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VALID_EXTENSIONS
                .iter()
                .any(|valid| ext.eq_ignore_ascii_case(valid))
        })
}

/// Convert an RGB image to a `[3, H, W]` float tensor.
fn image_to_tensor<B: Backend>(image: DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let image = image.to_rgb32f();
    let (width, height) = image.dimensions();
    let data = TensorData::new(image.into_raw(), [height as usize, width as usize, 3]);
    // HWC to CHW
    Tensor::<B, 3>::from_data(data, device).permute([2, 0, 1])
}

/// Apply the ImageNet channel normalization.
fn normalize_image<B: Backend>(tensor: Tensor<B, 3>, device: &B::Device) -> Tensor<B, 3> {
    let mean = Tensor::<B, 1>::from_data(TensorData::new(IMAGENET_MEAN.to_vec(), [3]), device)
        .reshape([3, 1, 1]);
    let std = Tensor::<B, 1>::from_data(TensorData::new(IMAGENET_STD.to_vec(), [3]), device)
        .reshape([3, 1, 1]);

    (tensor - mean) / std
}

/// Convert an index-PNG label image to a `[H, W]` integer tensor.
fn mask_to_tensor<B: Backend>(mask: DynamicImage, device: &B::Device) -> Tensor<B, 2, Int> {
    let mask = mask.to_luma8();
    let (width, height) = mask.dimensions();
    let labels: Vec<i32> = mask.into_raw().into_iter().map(i32::from).collect();
    Tensor::from_data(
        TensorData::new(labels, [height as usize, width as usize]),
        device,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn random_image(size: usize) -> Tensor<TestBackend, 3> {
        Tensor::random(
            [3, size, size],
            Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn seg_batcher_stacks_samples() {
        let device = Default::default();
        let batcher = SegBatcher::<TestBackend>::new();

        let sample = || SegSample {
            image: random_image(32),
            mask: Tensor::zeros([32, 32], &device),
        };

        let batch = batcher.batch(vec![sample(), sample()], &device);
        assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
        assert_eq!(batch.masks.dims(), [2, 32, 32]);
    }

    #[test]
    fn cls_batcher_stacks_samples_and_labels() {
        let device = Default::default();
        let batcher = ClsBatcher::<TestBackend>::new();

        let items = vec![
            ClsSample {
                image: random_image(32),
                label: 3,
            },
            ClsSample {
                image: random_image(32),
                label: 0,
            },
        ];

        let batch = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
        assert_eq!(batch.targets.dims(), [2]);

        let labels = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![3, 0]);
    }

    #[test]
    fn missing_directories_are_reported() {
        let device = Default::default();
        let result = SegDataset::<TestBackend>::new("/nonexistent", (64, 64), &device);

        match result {
            Err(SebNetError::DatasetError { message }) => {
                assert!(message.contains("does not exist"));
            }
            _ => panic!("expected a dataset error"),
        }
    }
}
