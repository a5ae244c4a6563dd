//! Semantic boundary detection heads.
//!
//! Each head turns a set of trunk features into two per-class boundary
//! logit maps at 1/8 resolution: a `side` map from the deepest stage
//! alone and a `fuse` map combining all scales. Three fusion schemes
//! are provided: [`CaseNetHead`] fuses through a grouped convolution
//! over a sliced concatenation, [`DffHead`] weights the slices with a
//! location-adaptive learner, and [`BemHead`] aggregates the sides
//! residually before a separable fusion convolution.

use backbones::BasicBlock;
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        activation::softmax,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::{
    config::SbdHeadKind,
    error::{SebNetError, SebNetResult},
};

/// Output of a semantic boundary detection head.
///
/// Both maps hold per-class boundary logits at 1/8 resolution.
#[derive(Debug, Clone)]
pub struct SbdOutput<B: Backend> {
    /// Logits predicted from the deepest side alone.
    pub side: Tensor<B, 4>,
    /// Logits after multi-scale fusion.
    pub fuse: Tensor<B, 4>,
}

/// Learns per-location weights for a set of feature slices.
///
/// Three 1x1 convolutions (the last without activation) map a weight
/// feature to `out_channels` maps, reshaped to one weight per slice
/// and per group. `out_channels` must be divisible by `num_slices`.
#[derive(Module, Debug)]
pub struct LocationAdaptiveLearner<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    relu: Relu,
    num_slices: usize,
}

impl<B: Backend> LocationAdaptiveLearner<B> {
    /// Creates a new learner producing `out_channels / num_slices`
    /// weights per slice.
    ///
    /// # Errors
    ///
    /// Returns [`SebNetError::ModelInitializationFailed`] if
    /// `out_channels` is not divisible by `num_slices`.
    pub fn new(
        num_slices: usize,
        in_channels: usize,
        out_channels: usize,
        device: &B::Device,
    ) -> SebNetResult<Self> {
        if num_slices == 0 || out_channels % num_slices != 0 {
            return Err(SebNetError::ModelInitializationFailed {
                reason: format!(
                    "location-adaptive learner needs out_channels divisible by num_slices, \
                     got {out_channels} and {num_slices}"
                ),
            });
        }

        Ok(Self {
            conv1: Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: Conv2dConfig::new([out_channels, out_channels], [1, 1]).init(device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            conv3: Conv2dConfig::new([out_channels, out_channels], [1, 1]).init(device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            num_slices,
        })
    }

    /// Produces slice weights of shape
    /// `[batch, num_slices, out_channels / num_slices, height, width]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 5> {
        let [batch, _, height, width] = x.dims();
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let x = self.relu.forward(self.bn2.forward(self.conv2.forward(x)));
        let x = self.bn3.forward(self.conv3.forward(x));

        let [_, out_channels, _, _] = x.dims();
        x.reshape([
            batch,
            self.num_slices,
            out_channels / self.num_slices,
            height,
            width,
        ])
    }
}

/// Interleaves the per-class slices of `side5` with the three shared
/// side maps: output channel `4k + j` holds class `k`'s deep slice for
/// `j = 0` and the shared sides for `j = 1..=3`.
fn sliced_concat<B: Backend>(
    side1: &Tensor<B, 4>,
    side2: &Tensor<B, 4>,
    side3: &Tensor<B, 4>,
    side5: &Tensor<B, 4>,
    num_classes: usize,
) -> Tensor<B, 4> {
    let [batch, _, height, width] = side5.dims();

    let mut parts = Vec::with_capacity(num_classes * 4);
    for class_idx in 0..num_classes {
        parts.push(
            side5
                .clone()
                .slice([0..batch, class_idx..class_idx + 1, 0..height, 0..width]),
        );
        parts.push(side1.clone());
        parts.push(side2.clone());
        parts.push(side3.clone());
    }

    Tensor::cat(parts, 1)
}

fn deconv<B: Backend>(
    channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([channels, channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_bias(false)
        .init(device)
}

/// Configuration for [`CaseNetHead`].
#[derive(Config, Debug)]
pub struct CaseNetHeadConfig {
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of boundary classes.
    num_classes: usize,
}

impl CaseNetHeadConfig {
    /// Initialize a new [`CaseNetHead`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CaseNetHead<B> {
        let channels = self.channels;
        let num_classes = self.num_classes;
        CaseNetHead {
            side1: Conv2dConfig::new([channels * 2, 1], [1, 1]).init(device),
            side2: Conv2dConfig::new([channels * 4, 1], [1, 1]).init(device),
            side2_up: deconv(1, 4, 2, 1, device),
            side3: Conv2dConfig::new([channels * 8, 1], [1, 1]).init(device),
            side3_up: deconv(1, 8, 4, 2, device),
            side5: Conv2dConfig::new([channels * 16, num_classes], [1, 1]).init(device),
            side5_up: deconv(num_classes, 16, 8, 4, device),
            fuse: Conv2dConfig::new([num_classes * 4, num_classes], [1, 1])
                .with_groups(num_classes)
                .init(device),
            num_classes,
        }
    }
}

/// CASENet-style boundary head.
///
/// The three shallow sides each produce a single class-agnostic map
/// while the deepest side produces one map per class. After upsampling
/// everything to 1/8 resolution, a grouped 1x1 convolution fuses each
/// class slice with the shared sides.
#[derive(Module, Debug)]
pub struct CaseNetHead<B: Backend> {
    side1: Conv2d<B>,
    side2: Conv2d<B>,
    side2_up: ConvTranspose2d<B>,
    side3: Conv2d<B>,
    side3_up: ConvTranspose2d<B>,
    side5: Conv2d<B>,
    side5_up: ConvTranspose2d<B>,
    fuse: Conv2d<B>,
    num_classes: usize,
}

impl<B: Backend> CaseNetHead<B> {
    /// Forward pass over the 1/8, 1/16, 1/32 and deepest trunk features.
    pub fn forward(
        &self,
        x2: Tensor<B, 4>,
        x3: Tensor<B, 4>,
        x4: Tensor<B, 4>,
        x5: Tensor<B, 4>,
    ) -> SbdOutput<B> {
        let side1 = self.side1.forward(x2);
        let side2 = self.side2_up.forward(self.side2.forward(x3));
        let side3 = self.side3_up.forward(self.side3.forward(x4));
        let side5 = self.side5_up.forward(self.side5.forward(x5));

        let fused = sliced_concat(&side1, &side2, &side3, &side5, self.num_classes);
        let fuse = self.fuse.forward(fused);

        SbdOutput { side: side5, fuse }
    }
}

/// Configuration for [`DffHead`].
#[derive(Config, Debug)]
pub struct DffHeadConfig {
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of boundary classes.
    num_classes: usize,
}

impl DffHeadConfig {
    /// Initialize a new [`DffHead`] module.
    ///
    /// # Errors
    ///
    /// Propagates failures from the location-adaptive learner.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SebNetResult<DffHead<B>> {
        let channels = self.channels;
        let num_classes = self.num_classes;
        Ok(DffHead {
            side1: Conv2dConfig::new([channels * 2, 1], [1, 1]).init(device),
            side1_bn: BatchNormConfig::new(1).init(device),
            side2: Conv2dConfig::new([channels * 4, 1], [1, 1]).init(device),
            side2_bn: BatchNormConfig::new(1).init(device),
            side2_up: deconv(1, 4, 2, 1, device),
            side3: Conv2dConfig::new([channels * 8, 1], [1, 1]).init(device),
            side3_bn: BatchNormConfig::new(1).init(device),
            side3_up: deconv(1, 8, 4, 2, device),
            side5: Conv2dConfig::new([channels * 16, num_classes], [1, 1]).init(device),
            side5_bn: BatchNormConfig::new(num_classes).init(device),
            side5_up: deconv(num_classes, 16, 8, 4, device),
            side5_w: Conv2dConfig::new([channels * 16, num_classes * 4], [1, 1]).init(device),
            side5_w_bn: BatchNormConfig::new(num_classes * 4).init(device),
            side5_w_up: deconv(num_classes * 4, 16, 8, 4, device),
            ada_learner: LocationAdaptiveLearner::new(
                num_classes,
                num_classes * 4,
                num_classes * 4,
                device,
            )?,
            num_classes,
        })
    }
}

/// Dynamic feature fusion boundary head.
///
/// Sides follow the CASENet layout with batch normalization after
/// each side convolution. Instead of a fixed grouped convolution, the
/// fusion weights every slice of the sliced concatenation with maps
/// predicted per location from the deepest stage.
#[derive(Module, Debug)]
pub struct DffHead<B: Backend> {
    side1: Conv2d<B>,
    side1_bn: BatchNorm<B, 2>,
    side2: Conv2d<B>,
    side2_bn: BatchNorm<B, 2>,
    side2_up: ConvTranspose2d<B>,
    side3: Conv2d<B>,
    side3_bn: BatchNorm<B, 2>,
    side3_up: ConvTranspose2d<B>,
    side5: Conv2d<B>,
    side5_bn: BatchNorm<B, 2>,
    side5_up: ConvTranspose2d<B>,
    side5_w: Conv2d<B>,
    side5_w_bn: BatchNorm<B, 2>,
    side5_w_up: ConvTranspose2d<B>,
    ada_learner: LocationAdaptiveLearner<B>,
    num_classes: usize,
}

impl<B: Backend> DffHead<B> {
    /// Forward pass over the 1/8, 1/16, 1/32 and deepest trunk features.
    pub fn forward(
        &self,
        x2: Tensor<B, 4>,
        x3: Tensor<B, 4>,
        x4: Tensor<B, 4>,
        x5: Tensor<B, 4>,
    ) -> SbdOutput<B> {
        let side1 = self.side1_bn.forward(self.side1.forward(x2));
        let side2 = self
            .side2_up
            .forward(self.side2_bn.forward(self.side2.forward(x3)));
        let side3 = self
            .side3_up
            .forward(self.side3_bn.forward(self.side3.forward(x4)));
        let side5 = self
            .side5_up
            .forward(self.side5_bn.forward(self.side5.forward(x5.clone())));
        let side5_w = self
            .side5_w_up
            .forward(self.side5_w_bn.forward(self.side5_w.forward(x5)));

        let weights = self.ada_learner.forward(side5_w);

        let fused = sliced_concat(&side1, &side2, &side3, &side5, self.num_classes);
        let [batch, _, height, width] = fused.dims();
        let fused = fused.reshape([batch, self.num_classes, 4, height, width]);

        let fuse = (fused * weights)
            .sum_dim(2)
            .reshape([batch, self.num_classes, height, width]);

        SbdOutput { side: side5, fuse }
    }
}

/// Configuration for [`BemHead`].
#[derive(Config, Debug)]
pub struct BemHeadConfig {
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of boundary classes.
    num_classes: usize,
}

impl BemHeadConfig {
    /// Initialize a new [`BemHead`] module.
    ///
    /// # Errors
    ///
    /// Propagates failures from the location-adaptive learner.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SebNetResult<BemHead<B>> {
        let channels = self.channels;
        let side_channels = channels * 2;

        let side = |in_channels: usize, out_channels: usize, stride: usize| {
            Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
        };

        Ok(BemHead {
            side1: side(channels, side_channels, 2).init(device),
            side1_bn: BatchNormConfig::new(side_channels).init(device),
            side2: side(channels * 2, side_channels, 1).init(device),
            side2_bn: BatchNormConfig::new(side_channels).init(device),
            side3: side(channels * 4, side_channels, 1).init(device),
            side3_bn: BatchNormConfig::new(side_channels).init(device),
            side5: side(channels * 16, side_channels, 1).init(device),
            side5_bn: BatchNormConfig::new(side_channels).init(device),
            side5_w: side(channels * 16, side_channels * 4, 1).init(device),
            side5_w_bn: BatchNormConfig::new(side_channels * 4).init(device),
            layer1: BasicBlock::new(side_channels, side_channels, 1, false, device),
            layer2: BasicBlock::new(side_channels, side_channels, 1, false, device),
            sep_conv_depthwise: Conv2dConfig::new([side_channels * 4, side_channels * 4], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_groups(side_channels * 4)
                .init(device),
            sep_conv_pointwise: Conv2dConfig::new([side_channels * 4, side_channels], [1, 1])
                .init(device),
            sep_conv_bn: BatchNormConfig::new(side_channels).init(device),
            ada_learner: LocationAdaptiveLearner::new(
                side_channels,
                side_channels * 4,
                side_channels * 4,
                device,
            )?,
            side_proj: Conv2dConfig::new([side_channels, self.num_classes], [1, 1]).init(device),
            fuse_proj: Conv2dConfig::new([side_channels, self.num_classes], [1, 1]).init(device),
            relu: Relu::new(),
        })
    }
}

/// Boundary extraction module.
///
/// Aggregates the sides residually at 1/8 resolution in a channel
/// width tied to the trunk (2C): each deeper side is added to the
/// running feature and refined by a residual block. The fusion
/// multiplies the stacked sides with softmax-normalized location
/// weights before a separable convolution, and per-class projections
/// produce the final logit maps.
#[derive(Module, Debug)]
pub struct BemHead<B: Backend> {
    side1: Conv2d<B>,
    side1_bn: BatchNorm<B, 2>,
    side2: Conv2d<B>,
    side2_bn: BatchNorm<B, 2>,
    side3: Conv2d<B>,
    side3_bn: BatchNorm<B, 2>,
    side5: Conv2d<B>,
    side5_bn: BatchNorm<B, 2>,
    side5_w: Conv2d<B>,
    side5_w_bn: BatchNorm<B, 2>,
    layer1: BasicBlock<B>,
    layer2: BasicBlock<B>,
    sep_conv_depthwise: Conv2d<B>,
    sep_conv_pointwise: Conv2d<B>,
    sep_conv_bn: BatchNorm<B, 2>,
    ada_learner: LocationAdaptiveLearner<B>,
    side_proj: Conv2d<B>,
    fuse_proj: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> BemHead<B> {
    /// Forward pass over the 1/4, 1/8, 1/16 and deepest trunk features.
    pub fn forward(
        &self,
        x1: Tensor<B, 4>,
        x2: Tensor<B, 4>,
        x3: Tensor<B, 4>,
        x5: Tensor<B, 4>,
    ) -> SbdOutput<B> {
        let side1 = self.side1_bn.forward(self.side1.forward(x1));
        let [batch, side_channels, height, width] = side1.dims();
        let up = |t: Tensor<B, 4>| {
            interpolate(
                t,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        let side2 = self
            .layer1
            .forward(side1.clone() + self.side2_bn.forward(self.side2.forward(x2)));
        let side3 = self
            .layer2
            .forward(up(self.side3_bn.forward(self.side3.forward(x3))) + side2.clone());
        let side5 = side3.clone() + up(self.side5_bn.forward(self.side5.forward(x5.clone())));

        let weight_feat = up(self.side5_w_bn.forward(self.side5_w.forward(x5)));
        let weights = softmax(self.ada_learner.forward(weight_feat), 2);

        let stacked = Tensor::cat(vec![side1, side2, side3, side5.clone()], 1)
            .reshape([batch, side_channels, 4, height, width]);
        let fused = (stacked * weights).reshape([batch, side_channels * 4, height, width]);

        let fused = self.sep_conv_bn.forward(
            self.sep_conv_pointwise
                .forward(self.sep_conv_depthwise.forward(fused)),
        );
        let fused = self.relu.forward(fused);

        SbdOutput {
            side: self.side_proj.forward(side5),
            fuse: self.fuse_proj.forward(fused),
        }
    }
}

/// Configuration for [`SbdHead`].
#[derive(Config, Debug)]
pub struct SbdHeadConfig {
    /// Which head to build.
    kind: SbdHeadKind,
    /// Base channel count C of the trunk.
    channels: usize,
    /// Number of boundary classes.
    num_classes: usize,
}

impl SbdHeadConfig {
    /// Initialize the configured boundary detection head.
    ///
    /// # Errors
    ///
    /// Propagates initialization failures from the selected head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SebNetResult<SbdHead<B>> {
        Ok(match self.kind {
            SbdHeadKind::CaseNet => SbdHead::CaseNet(
                CaseNetHeadConfig::new(self.channels, self.num_classes).init(device),
            ),
            SbdHeadKind::Dff => {
                SbdHead::Dff(DffHeadConfig::new(self.channels, self.num_classes).init(device)?)
            }
            SbdHeadKind::Bem => {
                SbdHead::Bem(BemHeadConfig::new(self.channels, self.num_classes).init(device)?)
            }
        })
    }
}

/// Boundary detection head selected by the model configuration.
#[derive(Module, Debug)]
pub enum SbdHead<B: Backend> {
    /// Grouped sliced-concatenation fusion.
    CaseNet(CaseNetHead<B>),
    /// Location-adaptive slice weighting.
    Dff(DffHead<B>),
    /// Residual side aggregation.
    Bem(BemHead<B>),
}

impl<B: Backend> SbdHead<B> {
    /// Forward pass over the five trunk features, ordered from the
    /// shallowest (1/4) to the deepest stage.
    pub fn forward(&self, features: &[Tensor<B, 4>; 5]) -> SbdOutput<B> {
        let [x1, x2, x3, x4, x5] = features;
        match self {
            Self::CaseNet(head) => head.forward(x2.clone(), x3.clone(), x4.clone(), x5.clone()),
            Self::Dff(head) => head.forward(x2.clone(), x3.clone(), x4.clone(), x5.clone()),
            Self::Bem(head) => head.forward(x1.clone(), x2.clone(), x3.clone(), x5.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_input(channels: usize, size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [1, channels, size, size],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    fn trunk_features(channels: usize) -> [Tensor<TestBackend, 4>; 5] {
        [
            random_input(channels, 16),
            random_input(channels * 2, 8),
            random_input(channels * 4, 4),
            random_input(channels * 8, 2),
            random_input(channels * 16, 1),
        ]
    }

    #[test]
    fn every_head_emits_per_class_maps_at_an_eighth() {
        let device = Default::default();

        for kind in [SbdHeadKind::CaseNet, SbdHeadKind::Dff, SbdHeadKind::Bem] {
            let head = SbdHeadConfig::new(kind, 16, 4)
                .init::<TestBackend>(&device)
                .unwrap();

            let output = head.forward(&trunk_features(16));
            assert_eq!(output.side.dims(), [1, 4, 8, 8]);
            assert_eq!(output.fuse.dims(), [1, 4, 8, 8]);
        }
    }

    #[test]
    fn learner_weights_have_one_entry_per_slice() {
        let device = Default::default();
        let learner = LocationAdaptiveLearner::<TestBackend>::new(4, 16, 16, &device).unwrap();

        let weights = learner.forward(random_input(16, 8));
        assert_eq!(weights.dims(), [1, 4, 4, 8, 8]);
    }

    #[test]
    fn indivisible_slice_count_is_rejected() {
        let device = Default::default();
        let result = LocationAdaptiveLearner::<TestBackend>::new(3, 16, 16, &device);

        assert!(matches!(
            result,
            Err(SebNetError::ModelInitializationFailed { .. })
        ));
    }
}
