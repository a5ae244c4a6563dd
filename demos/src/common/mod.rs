//! Common utilities for the SEBNet demos.
//!
//! This module provides the shared functionality used across the
//! demo binaries: compile-time backend selection and image conversion.

pub mod backend;
pub mod image;

// Re-export commonly used items
pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
pub use image::{ImageUtils, CITYSCAPES_PALETTE};
