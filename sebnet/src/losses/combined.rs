//! The complete SEBNet training objective.
//!
//! Every head of the model is supervised: the main and auxiliary
//! segmentation logits against the label map, the binary boundary
//! logits against boundary targets derived from that map, and the two
//! semantic boundary outputs against per-class boundary targets. The
//! total is a weighted sum of the five terms.

use burn::{
    prelude::*,
    tensor::{backend::Backend, Int, Tensor},
};

use super::{
    boundary::{boundary_targets, class_boundary_targets},
    BoundaryBceLoss, SegCrossEntropyLoss, SegCrossEntropyLossConfig,
};
use crate::models::SebNetForwardOutput;

/// Configuration for the combined SEBNet loss.
#[derive(Config, Debug)]
pub struct SebNetLossConfig {
    /// Weight of the main segmentation cross-entropy.
    #[config(default = 1.0)]
    pub seg_weight: f32,
    /// Weight of the auxiliary segmentation cross-entropy.
    #[config(default = 0.4)]
    pub aux_weight: f32,
    /// Weight of the binary boundary loss.
    #[config(default = 20.0)]
    pub boundary_weight: f32,
    /// Weight of the semantic boundary side loss.
    #[config(default = 1.0)]
    pub side_weight: f32,
    /// Weight of the semantic boundary fusion loss.
    #[config(default = 1.0)]
    pub fuse_weight: f32,
    /// Per-class rescaling weights for the segmentation terms.
    pub class_weights: Option<Vec<f32>>,
    /// Label value excluded from all terms.
    #[config(default = 255)]
    pub ignore_index: usize,
}

/// Combined multi-head loss for SEBNet training.
#[derive(Module, Debug)]
pub struct SebNetLoss<B: Backend> {
    pub seg_weight: f32,
    pub aux_weight: f32,
    pub boundary_weight: f32,
    pub side_weight: f32,
    pub fuse_weight: f32,
    pub ignore_index: usize,
    cross_entropy: SegCrossEntropyLoss<B>,
    boundary_bce: BoundaryBceLoss<B>,
}

impl SebNetLossConfig {
    /// Initialize a new combined loss with the given configuration.
    pub fn init<B: Backend>(&self) -> SebNetLoss<B> {
        SebNetLoss {
            seg_weight: self.seg_weight,
            aux_weight: self.aux_weight,
            boundary_weight: self.boundary_weight,
            side_weight: self.side_weight,
            fuse_weight: self.fuse_weight,
            ignore_index: self.ignore_index,
            cross_entropy: SegCrossEntropyLossConfig::new()
                .with_class_weights(self.class_weights.clone())
                .with_ignore_index(self.ignore_index)
                .init(),
            boundary_bce: BoundaryBceLoss::new(),
        }
    }
}

impl<B: Backend> Default for SebNetLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SebNetLoss<B> {
    /// Create a new combined loss with default configuration.
    pub fn new() -> Self {
        SebNetLossConfig::new().init()
    }

    /// Calculate the total training loss for one forward pass.
    ///
    /// Boundary targets are derived from `targets` on the fly, so the
    /// dataset only has to provide the segmentation label map.
    ///
    /// # Arguments
    /// * `output` - The multi-head model output at input resolution
    /// * `targets` - Label map with shape `[N, H, W]`
    ///
    /// # Returns
    /// The weighted sum of the five loss terms.
    pub fn forward(
        &self,
        output: &SebNetForwardOutput<B>,
        targets: Tensor<B, 3, Int>,
    ) -> Tensor<B, 1> {
        let [_, num_classes, _, _] = output.logits.dims();

        let boundary = boundary_targets(targets.clone(), self.ignore_index);
        let class_boundary =
            class_boundary_targets(targets.clone(), num_classes, self.ignore_index);

        let seg = self
            .cross_entropy
            .forward(output.logits.clone(), targets.clone());
        let aux = self.cross_entropy.forward(output.aux_logits.clone(), targets);
        let edge = self
            .boundary_bce
            .forward(output.boundary_logits.clone(), boundary);
        let side = self
            .boundary_bce
            .forward(output.sbd_side.clone(), class_boundary.clone());
        let fuse = self
            .boundary_bce
            .forward(output.sbd_fuse.clone(), class_boundary);

        seg * self.seg_weight
            + aux * self.aux_weight
            + edge * self.boundary_weight
            + side * self.side_weight
            + fuse * self.fuse_weight
    }
}
