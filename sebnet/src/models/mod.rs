//! # Model Architectures
//!
//! This module aggregates the components of the SEBNet model family.
//! It is organized into sub-modules:
//!
//! - `classifier`: The ImageNet pretraining model built on the shared trunk.
//! - `heads`: The segmentation and classification prediction heads.
//! - `modules`: Architecture building blocks: the P/D branches, the
//!   pixel-attention fusion, pyramid pooling and the semantic boundary heads.
//! - `sebnet`: The main `SebNet` segmentation model.
//!
//! The components are re-exported for easy access from the parent module.

pub mod classifier;
pub mod heads;
pub mod modules;
pub mod sebnet;

pub use classifier::*;
pub use heads::*;
pub use modules::*;
pub use sebnet::*;
