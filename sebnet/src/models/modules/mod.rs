//! Building-block modules of the SEBNet architecture.

pub mod branches;
pub mod pag;
pub mod ppm;
pub mod sbd;

pub use branches::*;
pub use pag::*;
pub use ppm::*;
pub use sbd::*;
