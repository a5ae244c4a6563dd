//! Enumerations for SEBNet configuration options.
//!
//! These enums select between the architectural alternatives of the
//! SEBNet family: the semantic boundary detection head, the pyramid
//! pooling module, and the predefined model variants.

use burn::prelude::*;

/// Semantic boundary detection head selection.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum SbdHeadKind {
    /// CASENet-style head with grouped sliced-concatenation fusion.
    CaseNet,
    /// Dynamic feature fusion head with a location-adaptive learner.
    Dff,
    /// Boundary extraction module with residual side aggregation.
    Bem,
}

/// Pyramid pooling module selection.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum PyramidPoolingKind {
    /// Deep aggregation pyramid pooling with cascaded scale fusion.
    Dappm,
    /// Parallel aggregation pyramid pooling with a grouped scale conv.
    Pappm,
}

/// Predefined SEBNet model sizes.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum SebNetVariant {
    /// Small variant (32 base channels, 2 stem blocks).
    S,
    /// Medium variant (64 base channels, 2 stem blocks).
    M,
    /// Large variant (64 base channels, 3 stem blocks, DAPPM).
    L,
}
