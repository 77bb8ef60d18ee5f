//! Convolutional gridding and degridding of radio-interferometric
//! visibilities.
//!
//! Visibilities are handed over in [`VisChunk`]s, the convolution function in
//! a [`ConvFuncStore`], and grids are dense `[x][y][pol][chan]` arrays owned
//! by the caller. [`VisResampler`] ties these together.

pub mod conv_func;
pub mod degridding;
mod error;
pub mod grid;
pub mod gridding;
pub mod mapper;
pub mod resampler;
pub mod residuals;
pub mod synthetic;
pub mod vis_chunk;

pub use conv_func::ConvFuncStore;
pub use degridding::{grid_to_data, DegriddingStats};
pub use error::ResamplerError;
pub use grid::{Grid, GridFloat, GridShape, GridStore, SharedGrid, SumOfWeights};
pub use gridding::{data_to_grid, GriddingStats};
pub use mapper::{ChanPolMaps, CoordinateMapper, MappedSample, UvwTransform};
pub use resampler::VisResampler;
pub use residuals::compute_residuals;
pub use vis_chunk::{row_chunks, VisBuffer, VisChunk};

use marlu::{c32, c64};

/// Single- to double-precision complex.
#[inline]
pub(crate) fn promote(c: c32) -> c64 {
    c64::new(f64::from(c.re), f64::from(c.im))
}
