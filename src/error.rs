//! Errors for structural problems with resampler inputs.
//!
//! Data anomalies (flagged samples, zero weights, samples whose support window
//! falls off the grid) are not errors; they are skipped and counted.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResamplerError {
    #[error("{what} has shape {got:?}, but {expected:?} was expected")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{what} has length {got}, but {expected} was expected")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Row range {start}..{end} is not within the {num_rows} available rows")]
    BadRowRange {
        start: usize,
        end: usize,
        num_rows: usize,
    },

    #[error("The convolution function sampling on axis {axis} is 0; this is not permitted")]
    ZeroSampling { axis: usize },

    #[error("The convolution function has {len} taps, but support {support} and sampling {sampling} need at least {needed}")]
    ConvFuncTooShort {
        len: usize,
        support: usize,
        sampling: usize,
        needed: usize,
    },

    #[error("Residuals against the corrected data were requested, but the chunk has no corrected data")]
    NoCorrectedData,

    #[error("The chunk size was 0; this is not permitted")]
    ZeroChunkSize,
}
