//! # SEBNet-Burn
//!
//! This crate provides a Rust implementation of SEBNet, a real-time
//! semantic segmentation network with explicit semantic boundary
//! supervision, built using the Burn deep learning framework.
//!
//! ## Modules
//!
//! - `config`: Configuration structures driving model construction,
//!   with predefined S/M/L variants.
//! - `error`: The custom error types used throughout the crate.
//! - `models`: The model architectures: the `SebNet` segmentation model,
//!   the `SebNetClassifier` pretraining model, and their building blocks.
//! - `losses`: The multi-head training objective and its components.
//! - `dataset`, `metrics`, `training` (feature `train`): dataset glue,
//!   evaluation metrics and the training step items.
//!
//! ## Key Components
//!
//! - `SebNet`: The main segmentation model.
//! - `SebNetClassifier`: The ImageNet pretraining model.
//! - `ModelConfig`: The primary configuration struct.
//! - `SebNetError`: The enum for all possible errors.

mod config;
mod error;
mod models;

pub mod losses;

#[cfg(feature = "train")]
pub mod dataset;
#[cfg(feature = "train")]
pub mod metrics;
#[cfg(feature = "train")]
pub mod training;

#[doc(inline)]
pub use config::{
    BackboneConfig, HeadConfig, ModelConfig, PyramidPoolingKind, SbdConfig, SbdHeadKind,
    SebNetVariant,
};
#[doc(inline)]
pub use error::{SebNetError, SebNetResult};
#[doc(inline)]
pub use models::classifier::{SebNetClassifier, SebNetClassifierConfig, SebNetClassifierRecord};
#[doc(inline)]
pub use models::sebnet::{
    SebNet, SebNetConfig, SebNetForwardOutput, SebNetRecord, INPUT_ALIGNMENT,
};
#[cfg(feature = "train")]
#[doc(inline)]
pub use dataset::{
    ClsBatch, ClsBatcher, ClsDataset, ClsSample, SegBatch, SegBatcher, SegDataset, SegSample,
};
#[cfg(feature = "train")]
#[doc(inline)]
pub use training::SegmentationOutput;

#[cfg(test)]
mod tests;
