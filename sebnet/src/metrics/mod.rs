//! Metrics for SEBNet training and evaluation.
//!
//! The segmentation quality metric is the mean intersection-over-union
//! accumulated over whole epochs; the classifier reuses Burn's built-in
//! accuracy metric and therefore has no counterpart here.

pub mod input;
pub mod iou;
pub mod loss;

pub use input::*;
pub use iou::*;
pub use loss::*;
