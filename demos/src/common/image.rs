//! Image processing utilities for the inference demo.
//!
//! Covers the two directions the binaries need: turning an image file
//! into a normalized network input, and turning predicted logits into
//! color-mapped or raw class-index images.

use anyhow::{Context, Result};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage};
use sebnet_burn::dataset::{IMAGENET_MEAN, IMAGENET_STD};
use std::path::Path;

/// Cityscapes train-id palette used to render predictions.
///
/// Index 0 is road, 18 is bicycle; anything outside the table renders
/// as black.
pub const CITYSCAPES_PALETTE: [[u8; 3]; 19] = [
    [128, 64, 128],
    [244, 35, 232],
    [70, 70, 70],
    [102, 102, 156],
    [190, 153, 153],
    [153, 153, 153],
    [250, 170, 30],
    [220, 220, 0],
    [107, 142, 35],
    [152, 251, 152],
    [70, 130, 180],
    [220, 20, 60],
    [255, 0, 0],
    [0, 0, 142],
    [0, 0, 70],
    [0, 60, 100],
    [0, 80, 100],
    [0, 0, 230],
    [119, 11, 32],
];

/// Image conversion helpers shared by the demo binaries.
pub struct ImageUtils;

impl ImageUtils {
    /// Loads an image file as a normalized network input.
    ///
    /// The image is resized to `(width, height)`, scaled to `[0, 1]`,
    /// and normalized with the ImageNet statistics the datasets use.
    ///
    /// # Returns
    /// Tensor of shape `[1, 3, height, width]`.
    pub fn load_normalized_image<B: Backend, P: AsRef<Path>>(
        path: P,
        target_size: (u32, u32),
        device: &B::Device,
    ) -> Result<Tensor<B, 4>> {
        let img = image::open(&path)
            .with_context(|| format!("Failed to open image at {}", path.as_ref().display()))?;

        let resized = img.resize_exact(target_size.0, target_size.1, FilterType::Lanczos3);
        let tensor = Self::dynamic_image_to_tensor(resized, device);

        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, device).reshape([1, 3, 1, 1]);

        Ok((tensor - mean) / std)
    }

    /// Converts a `DynamicImage` to a `[1, 3, height, width]` tensor in `[0, 1]`.
    fn dynamic_image_to_tensor<B: Backend>(img: DynamicImage, device: &B::Device) -> Tensor<B, 4> {
        let rgb_img = img.into_rgb32f();
        let (width, height) = rgb_img.dimensions();
        let buf = rgb_img.into_raw();

        let data =
            TensorData::new(buf, [height as usize, width as usize, 3]).convert::<B::FloatElem>();
        let tensor: Tensor<B, 3> = Tensor::from_data(data, device);

        tensor.permute([2, 0, 1]).unsqueeze::<4>()
    }

    /// Reduces segmentation logits to per-pixel class indices.
    ///
    /// # Arguments
    /// * `logits` - Tensor of shape `[1, num_classes, height, width]`
    ///
    /// # Returns
    /// Row-major class indices together with the prediction width and height.
    pub fn logits_to_class_ids<B: Backend>(logits: Tensor<B, 4>) -> Result<(Vec<u8>, u32, u32)> {
        let [batch, _, height, width] = logits.dims();
        if batch != 1 {
            anyhow::bail!("Expected batch size of 1, got {batch}");
        }

        let flat: Tensor<B, 1, Int> = logits.argmax(1).reshape([height * width]);
        let indices = flat
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("Failed to read prediction indices: {e:?}"))?;

        let ids = indices
            .into_iter()
            .map(|id| u8::try_from(id).unwrap_or(u8::MAX))
            .collect();

        Ok((ids, width as u32, height as u32))
    }

    /// Renders class indices as a color image using the Cityscapes palette.
    pub fn class_ids_to_color_image(ids: &[u8], width: u32, height: u32) -> Result<RgbImage> {
        let pixels = ids
            .iter()
            .flat_map(|&id| {
                CITYSCAPES_PALETTE
                    .get(id as usize)
                    .copied()
                    .unwrap_or([0, 0, 0])
            })
            .collect();

        RgbImage::from_raw(width, height, pixels)
            .context("Class index count does not match the image dimensions")
    }

    /// Packs class indices into a grayscale image, one index per pixel.
    pub fn class_ids_to_gray_image(ids: &[u8], width: u32, height: u32) -> Result<GrayImage> {
        GrayImage::from_raw(width, height, ids.to_vec())
            .context("Class index count does not match the image dimensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn logits_reduce_to_expected_class_ids() {
        let device = Default::default();

        // Two pixels: class 1 wins the first, class 0 the second.
        let logits =
            Tensor::<TestBackend, 4>::from_floats([[[[0.1, 0.9]], [[0.8, 0.2]]]], &device);

        let (ids, width, height) = ImageUtils::logits_to_class_ids(logits).unwrap();
        assert_eq!((width, height), (2, 1));
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn color_image_uses_palette_and_black_fallback() {
        let ids = [0u8, 18, 200];
        let img = ImageUtils::class_ids_to_color_image(&ids, 3, 1).unwrap();

        assert_eq!(img.get_pixel(0, 0).0, [128, 64, 128]);
        assert_eq!(img.get_pixel(1, 0).0, [119, 11, 32]);
        assert_eq!(img.get_pixel(2, 0).0, [0, 0, 0]);
    }

    #[test]
    fn gray_image_rejects_mismatched_dimensions() {
        let ids = [0u8, 1, 2];
        assert!(ImageUtils::class_ids_to_gray_image(&ids, 2, 2).is_err());
    }
}
