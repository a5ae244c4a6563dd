//! Loss functions for SEBNet training.
//!
//! Segmentation is supervised with a per-pixel cross-entropy, the
//! boundary heads with a class-balanced binary cross-entropy with
//! logits, and the classifier with Burn's cross-entropy. The
//! [`SebNetLoss`] combines the per-head terms into the single training
//! objective; boundary targets are derived from the label map at loss
//! time.

pub mod boundary;
pub mod classification;
pub mod combined;
pub mod cross_entropy;

pub use boundary::{boundary_targets, class_boundary_targets, BoundaryBceLoss};
pub use classification::{ClsLoss, ClsLossConfig};
pub use combined::{SebNetLoss, SebNetLossConfig};
pub use cross_entropy::{
    SegCrossEntropyLoss, SegCrossEntropyLossConfig, CITYSCAPES_CLASS_WEIGHTS,
};
