//! Utility types shared by every archive module.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`FrameDimensions`] / [`FrameCell`] - Frame-group index arithmetic

mod error;
mod dimensions;

pub use error::*;
pub use dimensions::*;
