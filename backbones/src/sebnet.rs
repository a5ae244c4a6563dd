//! SEBNet trunk implementation.
//!
//! The trunk is the shared feature extractor behind both the segmentation and
//! classification models: a two-convolution stem followed by five residual
//! stages that halve the resolution and grow the channel count. Stage outputs
//! `x1..x5` are exposed so the P/D branches and the boundary heads can tap
//! them at the depths they need.

use burn::{
    nn::Relu,
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::blocks::{BasicBlock, Bottleneck, ConvBlock, LayerBlock};

/// SEBNet trunk configuration.
#[derive(Config, Debug)]
pub struct SebNetBackboneConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
    /// Base channel count C; stages produce C, 2C, 4C, 8C, 16C.
    #[config(default = 64)]
    pub channels: usize,
    /// Blocks per stage in stages 1 and 2 (also sizes the P branch layers).
    #[config(default = 2)]
    pub num_stem_blocks: usize,
    /// Blocks per stage in stages 3 and 4.
    #[config(default = 3)]
    pub num_branch_blocks: usize,
    /// Stride of the stage-5 bottleneck: 2 for segmentation (x5 at 1/64),
    /// 1 for the dense classification variant (x5 at 1/32).
    #[config(default = 2)]
    pub stage5_stride: usize,
}

impl SebNetBackboneConfig {
    /// SEBNet-S trunk (C = 32).
    pub fn sebnet_s() -> Self {
        Self::new().with_channels(32)
    }

    /// SEBNet-M trunk (C = 64).
    pub fn sebnet_m() -> Self {
        Self::new()
    }

    /// SEBNet-L trunk (C = 64, deeper stages).
    pub fn sebnet_l() -> Self {
        Self::new().with_num_stem_blocks(3).with_num_branch_blocks(4)
    }

    /// Initialize the trunk.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SebNetBackbone<B> {
        let c = self.channels;

        let stem = vec![
            ConvBlock::new(self.in_channels, c, 3, 2, 1, true, device),
            ConvBlock::new(c, c, 3, 2, 1, true, device),
        ];
        let stage1 = LayerBlock::new(self.num_stem_blocks, c, c, 1, false, device);
        let stage2 = LayerBlock::new(self.num_stem_blocks, c, c * 2, 2, false, device);
        let stage3 = LayerBlock::new(self.num_branch_blocks, c * 2, c * 4, 2, false, device);
        let stage4 = LayerBlock::new(self.num_branch_blocks, c * 4, c * 8, 2, false, device);
        let stage5 = Bottleneck::new(c * 8, c * 16, self.stage5_stride, false, device);

        SebNetBackbone {
            stem,
            stage1,
            stage2,
            stage3,
            stage4,
            stage5,
            relu: Relu::new(),
        }
    }
}

/// SEBNet trunk: stem plus stages 1-5.
#[derive(Module, Debug)]
pub struct SebNetBackbone<B: Backend> {
    stem: Vec<ConvBlock<B>>,
    stage1: LayerBlock<B>,
    stage2: LayerBlock<B>,
    stage3: LayerBlock<B>,
    stage4: LayerBlock<B>,
    stage5: Bottleneck<B>,
    relu: Relu,
}

impl<B: Backend> SebNetBackbone<B> {
    /// Forward pass returning the five stage outputs.
    ///
    /// `x1..x4` are activated; `x5` is the raw stage-5 sum since all of its
    /// consumers (pyramid pooling, boundary side convolutions) start with
    /// their own BatchNorm or convolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 5] {
        let mut x = input;
        for conv in &self.stem {
            x = conv.forward(x);
        }

        let x1 = self.relu.forward(self.stage1.forward(x));
        let x2 = self.relu.forward(self.stage2.forward(x1.clone()));
        let x3 = self.relu.forward(self.stage3.forward(x2.clone()));
        let x4 = self.relu.forward(self.stage4.forward(x3.clone()));
        let x5 = self.stage5.forward(x4.clone());

        [x1, x2, x3, x4, x5]
    }
}

/// Dense expansion head of the classification trunk.
///
/// Resamples the stage 2-4 outputs to the stage-5 grid, concatenates all
/// four maps (30C) and compresses them with a strided basic block into the
/// 32C feature the classifier pools. Returns the stage-5 feature alongside
/// so the auxiliary head can supervise it.
#[derive(Module, Debug)]
pub struct DenseExpansion<B: Backend> {
    dense: BasicBlock<B>,
    bottleneck: Bottleneck<B>,
}

impl<B: Backend> DenseExpansion<B> {
    /// Create a new DenseExpansion for a trunk with base channel count `channels`.
    pub fn new(channels: usize, device: &Device<B>) -> Self {
        Self {
            dense: BasicBlock::new(channels * 30, channels * 32, 2, true, device),
            bottleneck: Bottleneck::new(channels * 32, channels * 32, 1, false, device),
        }
    }

    /// Consume the trunk features, returning `(x5, dense)`.
    pub fn forward(&self, features: [Tensor<B, 4>; 5]) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let [_x1, x2, x3, x4, x5] = features;
        let [_, _, h, w] = x5.dims();

        let resample = |x: Tensor<B, 4>| {
            interpolate(
                x,
                [h, w],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        let concat = Tensor::cat(
            vec![resample(x2), resample(x3), resample(x4), x5.clone()],
            1,
        );
        let out = self.bottleneck.forward(self.dense.forward(concat));

        (x5, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_image(size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [1, 3, size, size],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn test_sebnet_m_stage_shapes() {
        let device = Default::default();
        let model = SebNetBackboneConfig::sebnet_m().init::<TestBackend>(&device);

        let [x1, x2, x3, x4, x5] = model.forward(random_image(128));
        assert_eq!(x1.dims(), [1, 64, 32, 32]); // 128/4 = 32
        assert_eq!(x2.dims(), [1, 128, 16, 16]); // 128/8 = 16
        assert_eq!(x3.dims(), [1, 256, 8, 8]); // 128/16 = 8
        assert_eq!(x4.dims(), [1, 512, 4, 4]); // 128/32 = 4
        assert_eq!(x5.dims(), [1, 1024, 2, 2]); // 128/64 = 2
    }

    #[test]
    fn test_sebnet_s_stage_shapes() {
        let device = Default::default();
        let model = SebNetBackboneConfig::sebnet_s().init::<TestBackend>(&device);

        let [x1, _, _, _, x5] = model.forward(random_image(64));
        assert_eq!(x1.dims(), [1, 32, 16, 16]);
        assert_eq!(x5.dims(), [1, 512, 1, 1]);
    }

    #[test]
    fn test_stage5_stride_one_keeps_resolution() {
        let device = Default::default();
        let model = SebNetBackboneConfig::sebnet_s()
            .with_stage5_stride(1)
            .init::<TestBackend>(&device);

        let [_, _, _, x4, x5] = model.forward(random_image(64));
        assert_eq!(x4.dims(), [1, 256, 2, 2]);
        assert_eq!(x5.dims(), [1, 512, 2, 2]);
    }

    #[test]
    fn test_dense_expansion_shapes() {
        let device = Default::default();
        let model = SebNetBackboneConfig::sebnet_s()
            .with_stage5_stride(1)
            .init::<TestBackend>(&device);
        let expansion = DenseExpansion::new(32, &device);

        let features = model.forward(random_image(64));
        let (x5, dense) = expansion.forward(features);
        assert_eq!(x5.dims(), [1, 512, 2, 2]); // 16C at 1/32
        assert_eq!(dense.dims(), [1, 1024, 1, 1]); // 32C, strided once more
    }
}
