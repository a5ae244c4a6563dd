//! Core configuration structures for SEBNet.
//!
//! The configuration is split into focused sub-structures for the
//! trunk, the prediction heads, and the semantic boundary detection
//! module, aggregated by [`ModelConfig`].

use burn::prelude::*;

use super::enums::{PyramidPoolingKind, SbdHeadKind, SebNetVariant};
use crate::error::{SebNetError, SebNetResult};

/// Trunk (backbone) configuration.
///
/// The trunk produces five feature maps whose widths are multiples of
/// `channels`: C at 1/4 resolution, 2C at 1/8, 4C at 1/16, 8C at 1/32,
/// and 16C at the deepest stage.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Base channel count C of the trunk.
    #[config(default = 64)]
    pub channels: usize,

    /// Branch width of the pyramid pooling module.
    #[config(default = 96)]
    pub ppm_channels: usize,

    /// Number of residual blocks in the stem stages. Also selects the
    /// boundary branch layout (2 for the narrow variant, 3 for wide).
    #[config(default = 2)]
    pub num_stem_blocks: usize,

    /// Number of residual blocks in the deeper trunk stages.
    #[config(default = 3)]
    pub num_branch_blocks: usize,
}

impl BackboneConfig {
    /// Output width of the detail and boundary branches (4C).
    #[must_use]
    pub const fn branch_channels(&self) -> usize {
        self.channels * 4
    }

    /// Width of the deepest trunk stage (16C).
    #[must_use]
    pub const fn trunk_channels(&self) -> usize {
        self.channels * 16
    }

    /// Width of the dense expansion output used for classification (32C).
    #[must_use]
    pub const fn expanded_channels(&self) -> usize {
        self.channels * 32
    }

    /// Validates the trunk configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SebNetError::InvalidConfiguration`] if any field is
    /// outside its supported range.
    pub fn validate(&self) -> SebNetResult<()> {
        // 1. Channel counts must be positive
        if self.in_channels == 0 {
            return Err(SebNetError::InvalidConfiguration {
                reason: "in_channels must be positive".to_string(),
            });
        }
        if self.channels == 0 {
            return Err(SebNetError::InvalidConfiguration {
                reason: "channels must be positive".to_string(),
            });
        }
        if self.ppm_channels == 0 {
            return Err(SebNetError::InvalidConfiguration {
                reason: "ppm_channels must be positive".to_string(),
            });
        }

        // 2. Only the two published boundary branch layouts exist
        if self.num_stem_blocks != 2 && self.num_stem_blocks != 3 {
            return Err(SebNetError::InvalidConfiguration {
                reason: format!(
                    "num_stem_blocks must be 2 or 3, got {}",
                    self.num_stem_blocks
                ),
            });
        }

        // 3. Every trunk stage needs at least one block
        if self.num_branch_blocks == 0 {
            return Err(SebNetError::InvalidConfiguration {
                reason: "num_branch_blocks must be positive".to_string(),
            });
        }

        Ok(())
    }
}

/// Prediction head configuration.
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Number of output classes.
    #[config(default = 19)]
    pub num_classes: usize,

    /// Intermediate width of the segmentation heads.
    #[config(default = 128)]
    pub head_channels: usize,
}

/// Semantic boundary detection configuration.
#[derive(Config, Debug)]
pub struct SbdConfig {
    /// Which boundary detection head to build.
    #[config(default = "SbdHeadKind::Bem")]
    pub head: SbdHeadKind,
}

/// Complete SEBNet model configuration.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Trunk configuration.
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,

    /// Prediction head configuration.
    #[config(default = "HeadConfig::new()")]
    pub head: HeadConfig,

    /// Semantic boundary detection configuration.
    #[config(default = "SbdConfig::new()")]
    pub sbd: SbdConfig,

    /// Pyramid pooling module placed on the deepest trunk stage.
    #[config(default = "PyramidPoolingKind::Pappm")]
    pub pyramid_pooling: PyramidPoolingKind,
}

impl ModelConfig {
    /// Configuration of the small variant (32 base channels).
    #[must_use]
    pub fn sebnet_s() -> Self {
        Self::new().with_backbone(BackboneConfig::new().with_channels(32))
    }

    /// Configuration of the medium variant (64 base channels).
    #[must_use]
    pub fn sebnet_m() -> Self {
        Self::new()
    }

    /// Configuration of the large variant (64 base channels, deeper
    /// stages, DAPPM pooling and a wider segmentation head).
    #[must_use]
    pub fn sebnet_l() -> Self {
        Self::new()
            .with_backbone(
                BackboneConfig::new()
                    .with_ppm_channels(112)
                    .with_num_stem_blocks(3)
                    .with_num_branch_blocks(4),
            )
            .with_head(HeadConfig::new().with_head_channels(256))
            .with_pyramid_pooling(PyramidPoolingKind::Dappm)
    }

    /// Builds the configuration for a predefined variant.
    #[must_use]
    pub fn from_variant(variant: &SebNetVariant) -> Self {
        match variant {
            SebNetVariant::S => Self::sebnet_s(),
            SebNetVariant::M => Self::sebnet_m(),
            SebNetVariant::L => Self::sebnet_l(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SebNetError::InvalidConfiguration`] if any field is
    /// outside its supported range.
    pub fn validate(&self) -> SebNetResult<()> {
        self.backbone.validate()?;

        // The segmentation and boundary heads need at least two classes
        if self.head.num_classes < 2 {
            return Err(SebNetError::InvalidConfiguration {
                reason: format!(
                    "num_classes must be at least 2, got {}",
                    self.head.num_classes
                ),
            });
        }
        if self.head.head_channels == 0 {
            return Err(SebNetError::InvalidConfiguration {
                reason: "head_channels must be positive".to_string(),
            });
        }

        Ok(())
    }
}
