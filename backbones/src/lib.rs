//! Building blocks and trunks for the SEBNet model family.
//!
//! The `blocks` module provides the residual block library shared by the
//! trunk and the branch/fusion modules; `sebnet` assembles them into the
//! five-stage SEBNet trunk and the dense classification expansion.

mod blocks;
mod sebnet;

pub use blocks::*;
pub use sebnet::*;
