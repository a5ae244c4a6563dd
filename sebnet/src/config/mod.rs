//! Configuration module for SEBNet.
//!
//! Provides the structures that describe a SEBNet model: the trunk
//! layout, the prediction heads, the boundary detection head, and the
//! predefined size variants.

pub mod core;
pub mod enums;

pub use core::{BackboneConfig, HeadConfig, ModelConfig, SbdConfig};
pub use enums::{PyramidPoolingKind, SbdHeadKind, SebNetVariant};
