//! # SEBNet Classification Model
//!
//! The ImageNet pretraining variant of SEBNet: the shared trunk run at
//! stage-5 stride 1, a dense multi-scale expansion, and linear heads.
//! Training weights produced here seed the segmentation trunk.
//!
//! The main head pools the 32C dense expansion output; an auxiliary
//! head on the raw stage-5 feature regularizes the trunk and is dropped
//! at inference time.

use backbones::{DenseExpansion, SebNetBackbone, SebNetBackboneConfig};
use burn::prelude::*;

use super::{LinearClsHead, LinearClsHeadConfig};
use crate::{
    config::BackboneConfig,
    error::{SebNetError, SebNetResult},
};

#[cfg(feature = "train")]
use crate::{
    dataset::ClsBatch,
    losses::{ClsLoss, ClsLossConfig},
};

#[cfg(feature = "train")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

/// Configuration for the `SebNetClassifier` model.
#[derive(Config, Debug)]
pub struct SebNetClassifierConfig {
    /// Trunk configuration shared with the segmentation model.
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
    /// Number of target classes.
    #[config(default = 1000)]
    pub num_classes: usize,
    /// Weight of the auxiliary loss on the stage-5 feature.
    #[config(default = 0.4)]
    pub aux_weight: f32,
    /// Label smoothing of the classification loss.
    pub smoothing: Option<f32>,
}

impl SebNetClassifierConfig {
    /// Initializes a `SebNetClassifier` with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the model on.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SebNetResult<SebNetClassifier<B>> {
        self.backbone.validate()?;
        if self.num_classes < 2 {
            return Err(SebNetError::InvalidConfiguration {
                reason: format!("num_classes must be at least 2, got {}", self.num_classes),
            });
        }

        let channels = self.backbone.channels;

        // Stride 1 keeps stage 5 at 1/32 so the dense expansion sees a
        // grid aligned with stage 4.
        let backbone = SebNetBackboneConfig::new()
            .with_in_channels(self.backbone.in_channels)
            .with_channels(channels)
            .with_num_stem_blocks(self.backbone.num_stem_blocks)
            .with_num_branch_blocks(self.backbone.num_branch_blocks)
            .with_stage5_stride(1)
            .init(device);

        Ok(SebNetClassifier {
            backbone,
            expansion: DenseExpansion::new(channels, device),
            head: LinearClsHeadConfig::new(self.backbone.expanded_channels(), self.num_classes)
                .init(device),
            aux_head: LinearClsHeadConfig::new(self.backbone.trunk_channels(), self.num_classes)
                .init(device),
            #[cfg(feature = "train")]
            aux_weight: self.aux_weight,
            #[cfg(feature = "train")]
            loss: ClsLossConfig::new()
                .with_smoothing(self.smoothing)
                .init(device),
        })
    }
}

/// The SEBNet image classification model.
#[derive(Module, Debug)]
pub struct SebNetClassifier<B: Backend> {
    /// The shared trunk, run without the final stride.
    backbone: SebNetBackbone<B>,
    /// Multi-scale dense expansion feeding the main head.
    expansion: DenseExpansion<B>,
    /// The main classification head on the 32C expansion output.
    head: LinearClsHead<B>,
    /// The auxiliary head on the raw stage-5 feature.
    aux_head: LinearClsHead<B>,
    /// Scale of the auxiliary loss term.
    #[cfg(feature = "train")]
    aux_weight: f32,
    /// The classification loss for training.
    #[cfg(feature = "train")]
    loss: ClsLoss<B>,
}

impl<B: Backend> SebNetClassifier<B> {
    /// The inference forward pass, producing class logits of shape
    /// `[batch, num_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let (_, dense) = self.expansion.forward(self.backbone.forward(x));
        self.head.forward(dense)
    }

    /// Forward pass producing `(logits, aux_logits)` for training.
    pub fn forward_train(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (x5, dense) = self.expansion.forward(self.backbone.forward(x));
        (self.head.forward(dense), self.aux_head.forward(x5))
    }

    /// Forward pass for training and validation.
    #[cfg(feature = "train")]
    pub fn forward_classification(&self, batch: ClsBatch<B>) -> ClassificationOutput<B> {
        let (logits, aux_logits) = self.forward_train(batch.images);
        let loss = self.loss.forward(logits.clone(), batch.targets.clone())
            + self.loss.forward(aux_logits, batch.targets.clone()) * self.aux_weight;

        ClassificationOutput::new(loss, logits, batch.targets)
    }
}

#[cfg(feature = "train")]
impl<B: AutodiffBackend> TrainStep<ClsBatch<B>, ClassificationOutput<B>> for SebNetClassifier<B> {
    fn step(&self, batch: ClsBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "train")]
impl<B: Backend> ValidStep<ClsBatch<B>, ClassificationOutput<B>> for SebNetClassifier<B> {
    fn step(&self, batch: ClsBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn classifier_produces_class_logits() {
        let device = Default::default();
        let model = SebNetClassifierConfig::new()
            .with_backbone(BackboneConfig::new().with_channels(32))
            .with_num_classes(10)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random(
            [2, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let logits = model.forward(input.clone());
        assert_eq!(logits.dims(), [2, 10]);

        let (logits, aux_logits) = model.forward_train(input);
        assert_eq!(logits.dims(), [2, 10]);
        assert_eq!(aux_logits.dims(), [2, 10]);
    }

    #[test]
    fn classifier_rejects_single_class() {
        let device = Default::default();
        let result = SebNetClassifierConfig::new()
            .with_num_classes(1)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(SebNetError::InvalidConfiguration { .. })
        ));
    }
}
