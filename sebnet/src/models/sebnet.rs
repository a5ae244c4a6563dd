//! # SEBNet Model Implementation
//!
//! This module defines the main `SebNet` segmentation model, which combines the
//! shared trunk with the boundary-aware branches and the output heads.
//!
//! ## Core Components
//!
//! - `SebNetConfig`: A configuration struct to initialize the `SebNet` model.
//! - `SebNet`: The main model struct, which orchestrates the forward pass
//!   through the trunk, the P and D branches, pyramid pooling and the heads.
//! - `SebNetForwardOutput`: The multi-head output produced for training.
//!
//! The segmentation path fuses three streams at 1/8 resolution: the P branch
//! carrying fine spatial detail, the D branch carrying boundary evidence, and
//! the pyramid-pooled trunk output carrying global context. The semantic
//! boundary head taps the raw trunk stages directly.

use backbones::{SebNetBackbone, SebNetBackboneConfig};

use super::{
    DBranch, DBranchConfig, DappmConfig, PBranch, PBranchConfig, PappmConfig, PyramidPooling,
    SbdHead, SbdHeadConfig, SegHead, SegHeadConfig,
};
use crate::{
    config::{ModelConfig, PyramidPoolingKind},
    error::{SebNetError, SebNetResult},
};
use burn::{
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

#[cfg(feature = "train")]
use crate::{
    dataset::SegBatch,
    losses::{SebNetLoss, SebNetLossConfig},
    training::SegmentationOutput,
};

#[cfg(feature = "train")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

/// Spatial alignment required of network inputs.
///
/// Stage 5 runs at 1/64 resolution and the boundary head deconvolutions
/// assume exact stride multiples, so input height and width must both be
/// divisible by this value.
pub const INPUT_ALIGNMENT: usize = 64;

/// Configuration for the `SebNet` model.
#[derive(Config, Debug)]
pub struct SebNetConfig {
    /// The detailed model configuration.
    config: ModelConfig,
    /// The loss function configuration.
    #[cfg(feature = "train")]
    loss: SebNetLossConfig,
}

impl SebNetConfig {
    /// Initializes a `SebNet` model with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the model on.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SebNetResult<SebNet<B>> {
        self.config.validate()?;

        let channels = self.config.backbone.channels;
        let branch_channels = self.config.backbone.branch_channels();
        let trunk_channels = self.config.backbone.trunk_channels();
        let num_stem_blocks = self.config.backbone.num_stem_blocks;
        let num_classes = self.config.head.num_classes;
        let head_channels = self.config.head.head_channels;

        let backbone = SebNetBackboneConfig::new()
            .with_in_channels(self.config.backbone.in_channels)
            .with_channels(channels)
            .with_num_stem_blocks(num_stem_blocks)
            .with_num_branch_blocks(self.config.backbone.num_branch_blocks)
            .init(device);

        let spp = match self.config.pyramid_pooling {
            PyramidPoolingKind::Dappm => PyramidPooling::Dappm(
                DappmConfig::new(
                    trunk_channels,
                    self.config.backbone.ppm_channels,
                    branch_channels,
                )
                .init(device),
            ),
            PyramidPoolingKind::Pappm => PyramidPooling::Pappm(
                PappmConfig::new(
                    trunk_channels,
                    self.config.backbone.ppm_channels,
                    branch_channels,
                )
                .init(device),
            ),
        };

        Ok(SebNet {
            backbone,
            p_branch: PBranchConfig::new(channels, num_stem_blocks).init(device),
            d_branch: DBranchConfig::new(channels, num_stem_blocks).init(device),
            spp,
            sbd: SbdHeadConfig::new(self.config.sbd.head.clone(), channels, num_classes)
                .init(device)?,
            seg_head: SegHeadConfig::new(branch_channels, head_channels, num_classes).init(device),
            aux_head: SegHeadConfig::new(channels * 2, head_channels, num_classes).init(device),
            boundary_head: SegHeadConfig::new(channels * 2, channels, 1).init(device),
            #[cfg(feature = "train")]
            loss: self.loss.init(),
        })
    }
}

/// The multi-head output of a training forward pass.
///
/// All logits are upsampled to the input resolution.
#[derive(Debug, Clone)]
pub struct SebNetForwardOutput<B: Backend> {
    /// Segmentation logits of shape `[batch, num_classes, H, W]`.
    pub logits: Tensor<B, 4>,
    /// Auxiliary segmentation logits from the P branch.
    pub aux_logits: Tensor<B, 4>,
    /// Binary boundary logits from the D branch, shape `[batch, 1, H, W]`.
    pub boundary_logits: Tensor<B, 4>,
    /// Per-class side output of the semantic boundary head.
    pub sbd_side: Tensor<B, 4>,
    /// Per-class fused output of the semantic boundary head.
    pub sbd_fuse: Tensor<B, 4>,
}

/// The main SEBNet segmentation model.
#[derive(Module, Debug)]
pub struct SebNet<B: Backend> {
    /// The shared trunk.
    backbone: SebNetBackbone<B>,
    /// The detail-preserving branch running at 1/8 resolution.
    p_branch: PBranch<B>,
    /// The boundary branch running at 1/8 resolution.
    d_branch: DBranch<B>,
    /// Pyramid pooling over the deepest trunk feature.
    spp: PyramidPooling<B>,
    /// The semantic boundary detection head.
    sbd: SbdHead<B>,
    /// The main segmentation head on the fused features.
    seg_head: SegHead<B>,
    /// The auxiliary segmentation head on the P branch.
    aux_head: SegHead<B>,
    /// The binary boundary head on the D branch.
    boundary_head: SegHead<B>,
    /// The loss function for training.
    #[cfg(feature = "train")]
    loss: SebNetLoss<B>,
}

impl<B: Backend> SebNet<B> {
    /// The main forward pass, producing segmentation logits at the input
    /// resolution.
    ///
    /// # Arguments
    ///
    /// * `x` - The input tensor of shape `[batch, in_channels, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `H` or `W` is not divisible by [`INPUT_ALIGNMENT`].
    pub fn forward(&self, x: Tensor<B, 4>) -> SebNetResult<Tensor<B, 4>> {
        let [_, _, height, width] = x.dims();
        check_input_size(height, width)?;

        let [_, x2, x3, x4, x5] = self.backbone.forward(x);
        let (_, p_out) = self.p_branch.forward(x2.clone(), x3.clone(), x4.clone());
        let (_, d_out) = self.d_branch.forward(x2, x3, x4);

        let [_, _, fuse_height, fuse_width] = p_out.dims();
        let context = interpolate(
            self.spp.forward(x5),
            [fuse_height, fuse_width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );
        let logits = self.seg_head.forward(p_out + context + d_out);

        Ok(interpolate(
            logits,
            [height, width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        ))
    }

    /// Forward pass producing the outputs of every head.
    ///
    /// Runs the same fusion path as [`Self::forward`] and additionally
    /// evaluates the auxiliary, boundary and semantic boundary heads. All
    /// outputs are upsampled to the input resolution so the losses can be
    /// computed against full-size targets.
    ///
    /// # Errors
    ///
    /// Returns an error if `H` or `W` is not divisible by [`INPUT_ALIGNMENT`].
    pub fn forward_train(&self, x: Tensor<B, 4>) -> SebNetResult<SebNetForwardOutput<B>> {
        let [_, _, height, width] = x.dims();
        check_input_size(height, width)?;

        let features = self.backbone.forward(x);
        let sbd = self.sbd.forward(&features);

        let [_, x2, x3, x4, x5] = features;
        let (detail, p_out) = self.p_branch.forward(x2.clone(), x3.clone(), x4.clone());
        let (boundary, d_out) = self.d_branch.forward(x2, x3, x4);

        let [_, _, fuse_height, fuse_width] = p_out.dims();
        let context = interpolate(
            self.spp.forward(x5),
            [fuse_height, fuse_width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );
        let fused = p_out + context + d_out;

        let up = |t: Tensor<B, 4>| {
            interpolate(
                t,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        Ok(SebNetForwardOutput {
            logits: up(self.seg_head.forward(fused)),
            aux_logits: up(self.aux_head.forward(detail)),
            boundary_logits: up(self.boundary_head.forward(boundary)),
            sbd_side: up(sbd.side),
            sbd_fuse: up(sbd.fuse),
        })
    }

    /// Forward pass for training and validation.
    #[cfg(feature = "train")]
    pub fn forward_segmentation(&self, batch: SegBatch<B>) -> SebNetResult<SegmentationOutput<B>> {
        let output = self.forward_train(batch.images)?;
        let loss = self.loss.forward(&output, batch.masks.clone());

        Ok(SegmentationOutput {
            loss,
            logits: output.logits,
            targets: batch.masks,
        })
    }
}

fn check_input_size(height: usize, width: usize) -> SebNetResult<()> {
    if height % INPUT_ALIGNMENT != 0 || width % INPUT_ALIGNMENT != 0 {
        return Err(SebNetError::InvalidTensorShape {
            expected: format!("height and width divisible by {INPUT_ALIGNMENT}"),
            actual: format!("{height}x{width}"),
        });
    }
    Ok(())
}

#[cfg(feature = "train")]
impl<B: AutodiffBackend> TrainStep<SegBatch<B>, SegmentationOutput<B>> for SebNet<B> {
    fn step(&self, batch: SegBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch).unwrap();
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "train")]
impl<B: Backend> ValidStep<SegBatch<B>, SegmentationOutput<B>> for SebNet<B> {
    fn step(&self, batch: SegBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch).unwrap()
    }
}
