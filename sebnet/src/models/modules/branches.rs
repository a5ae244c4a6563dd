//! Detail and boundary branches running parallel to the trunk.
//!
//! Both branches keep 1/8 resolution while the trunk descends, and
//! periodically absorb trunk features: the detail branch through
//! pixel-attention-guided fusion, the boundary branch through plain
//! addition of compressed trunk features.

use backbones::{ConvBlock, LayerBlock};
use burn::{
    nn::Relu,
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use super::pag::{PagFM, PagFMConfig};

/// Configuration for [`PBranch`].
#[derive(Config, Debug)]
pub struct PBranchConfig {
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of residual blocks in the first two branch stages.
    num_stem_blocks: usize,
}

impl PBranchConfig {
    /// Initialize a new [`PBranch`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PBranch<B> {
        let channels = self.channels;
        PBranch {
            layer1: LayerBlock::new(
                self.num_stem_blocks,
                channels * 2,
                channels * 2,
                1,
                false,
                device,
            ),
            layer2: LayerBlock::new(
                self.num_stem_blocks,
                channels * 2,
                channels * 2,
                1,
                false,
                device,
            ),
            layer3: LayerBlock::new(1, channels * 2, channels * 4, 1, true, device),
            compression1: ConvBlock::new(channels * 4, channels * 2, 1, 1, 0, false, device),
            compression2: ConvBlock::new(channels * 8, channels * 2, 1, 1, 0, false, device),
            pag1: PagFMConfig::new(channels * 2, channels).init(device),
            pag2: PagFMConfig::new(channels * 2, channels).init(device),
            relu: Relu::new(),
        }
    }
}

/// Detail branch.
///
/// Runs at 1/8 resolution and fuses the 1/16 and 1/32 trunk stages
/// through [`PagFM`] gates after compressing them to the branch width.
/// The output widens to 4C through a final bottleneck stage and is
/// returned pre-activation.
#[derive(Module, Debug)]
pub struct PBranch<B: Backend> {
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    compression1: ConvBlock<B>,
    compression2: ConvBlock<B>,
    pag1: PagFM<B>,
    pag2: PagFM<B>,
    relu: Relu,
}

impl<B: Backend> PBranch<B> {
    /// Forward pass over the 1/8, 1/16 and 1/32 trunk features.
    ///
    /// Returns `(detail, out)` where `detail` is the 2C-wide feature
    /// after the first fusion, used for auxiliary supervision, and
    /// `out` is the 4C-wide branch output.
    pub fn forward(
        &self,
        x2: Tensor<B, 4>,
        x3: Tensor<B, 4>,
        x4: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let x_p = self.layer1.forward(x2);
        let x_p = self.pag1.forward(x_p, self.compression1.forward(x3));
        let detail = x_p.clone();

        let x_p = self.layer2.forward(self.relu.forward(x_p));
        let x_p = self.pag2.forward(x_p, self.compression2.forward(x4));

        let out = self.layer3.forward(self.relu.forward(x_p));
        (detail, out)
    }
}

/// Configuration for [`DBranch`].
#[derive(Config, Debug)]
pub struct DBranchConfig {
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of stem blocks of the trunk, selecting the branch layout.
    num_stem_blocks: usize,
}

impl DBranchConfig {
    /// Initialize a new [`DBranch`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DBranch<B> {
        let channels = self.channels;

        // The two-stem-block layout squeezes the branch to C before
        // widening again; the three-stem-block layout stays at 2C.
        let (layer1, layer2, diff1_channels) = if self.num_stem_blocks == 2 {
            (
                LayerBlock::new(1, channels * 2, channels, 1, false, device),
                LayerBlock::new(1, channels, channels * 2, 1, true, device),
                channels,
            )
        } else {
            (
                LayerBlock::new(1, channels * 2, channels * 2, 1, false, device),
                LayerBlock::new(1, channels * 2, channels * 2, 1, false, device),
                channels * 2,
            )
        };

        DBranch {
            layer1,
            layer2,
            layer3: LayerBlock::new(1, channels * 2, channels * 4, 1, true, device),
            diff1: ConvBlock::new(channels * 4, diff1_channels, 3, 1, 1, false, device),
            diff2: ConvBlock::new(channels * 8, channels * 2, 3, 1, 1, false, device),
            relu: Relu::new(),
        }
    }
}

/// Boundary branch.
///
/// Runs at 1/8 resolution and absorbs the 1/16 and 1/32 trunk stages
/// by adding their upsampled, width-matched projections. The feature
/// after the second addition is returned separately for boundary
/// supervision.
#[derive(Module, Debug)]
pub struct DBranch<B: Backend> {
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    diff1: ConvBlock<B>,
    diff2: ConvBlock<B>,
    relu: Relu,
}

impl<B: Backend> DBranch<B> {
    /// Forward pass over the 1/8, 1/16 and 1/32 trunk features.
    ///
    /// Returns `(boundary, out)` where `boundary` is the 2C-wide
    /// feature after the second difference addition and `out` is the
    /// 4C-wide branch output.
    pub fn forward(
        &self,
        x2: Tensor<B, 4>,
        x3: Tensor<B, 4>,
        x4: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let x_d = self.layer1.forward(x2);
        let [_, _, height, width] = x_d.dims();
        let up = |t: Tensor<B, 4>| {
            interpolate(
                t,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        let x_d = x_d + up(self.diff1.forward(x3));
        let x_d = self.layer2.forward(self.relu.forward(x_d));
        let x_d = x_d + up(self.diff2.forward(x4));
        let boundary = x_d.clone();

        let out = self.layer3.forward(self.relu.forward(x_d));
        (boundary, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    type TrunkFeatures = (
        Tensor<TestBackend, 4>,
        Tensor<TestBackend, 4>,
        Tensor<TestBackend, 4>,
    );

    fn trunk_features(channels: usize) -> TrunkFeatures {
        let device = Default::default();
        let rand = |ch: usize, size: usize| {
            Tensor::random(
                [1, ch, size, size],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            )
        };
        (
            rand(channels * 2, 8),
            rand(channels * 4, 4),
            rand(channels * 8, 2),
        )
    }

    #[test]
    fn p_branch_widens_to_four_c_at_an_eighth() {
        let device = Default::default();
        let branch = PBranchConfig::new(16, 2).init::<TestBackend>(&device);

        let (x2, x3, x4) = trunk_features(16);
        let (detail, out) = branch.forward(x2, x3, x4);

        assert_eq!(detail.dims(), [1, 32, 8, 8]);
        assert_eq!(out.dims(), [1, 64, 8, 8]);
    }

    #[test]
    fn d_branch_shapes_match_for_both_layouts() {
        let device = Default::default();

        for num_stem_blocks in [2, 3] {
            let branch = DBranchConfig::new(16, num_stem_blocks).init::<TestBackend>(&device);

            let (x2, x3, x4) = trunk_features(16);
            let (boundary, out) = branch.forward(x2, x3, x4);

            assert_eq!(boundary.dims(), [1, 32, 8, 8]);
            assert_eq!(out.dims(), [1, 64, 8, 8]);
        }
    }
}
