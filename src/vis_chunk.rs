//! Visibility data handed to the resampler.
//!
//! A [`VisChunk`] borrows everything the resampler reads for one call: the
//! positions, visibilities, flags and weights of a buffer, and the half-open
//! range of rows the call should work on. The model cube that degridding and
//! residual computation write to is passed alongside the chunk as a separate
//! mutable view.
//!
//! All cubes are `[pol][chan][row]`; imaging weights are `[chan][row]`.


use std::ops::Range;

use marlu::{c32, UVW};
use ndarray::prelude::*;

use crate::ResamplerError;

#[derive(Debug, Clone)]
pub struct VisChunk<'a> {
    /// The [`UVW`] coordinates of each row \[metres\]. `w` is not used.
    pub uvws: &'a [UVW],

    /// The observed visibilities.
    pub vis: ArrayView3<'a, c32>,

    /// The calibrated visibilities, if there are any.
    pub corrected: Option<ArrayView3<'a, c32>>,

    /// `true` means the visibility is excluded.
    pub flags: ArrayView3<'a, bool>,

    /// `true` means the whole row is excluded, regardless of `flags`.
    pub row_flags: &'a [bool],

    /// Imaging weights.
    pub imaging_weights: ArrayView2<'a, f32>,

    /// The centre frequency of each channel \[Hz\].
    pub freqs: &'a [f64],

    /// The phase-centre correction of each row \[metres\]. 0 means no
    /// correction.
    pub phase_delays: &'a [f64],

    /// The rows to be processed.
    pub rows: Range<usize>,
}

impl<'a> VisChunk<'a> {
    pub fn num_pols(&self) -> usize {
        self.vis.len_of(Axis(0))
    }

    pub fn num_chans(&self) -> usize {
        self.vis.len_of(Axis(1))
    }

    /// The total number of rows in the underlying buffer (not just those in
    /// `rows`).
    pub fn num_rows(&self) -> usize {
        self.vis.len_of(Axis(2))
    }

    /// The same data, restricted to another range of rows.
    pub fn with_rows(&self, rows: Range<usize>) -> VisChunk<'a> {
        VisChunk {
            rows,
            ..self.clone()
        }
    }

    /// Check that all of the arrays agree with the shape of the visibility
    /// cube, and that the row range is within the buffer.
    pub fn validate(&self) -> Result<(), ResamplerError> {
        let (num_pols, num_chans, num_rows) = self.vis.dim();
        let cube_shape = [num_pols, num_chans, num_rows];

        check_shape("flags", &cube_shape, self.flags.shape())?;
        if let Some(corrected) = self.corrected.as_ref() {
            check_shape("corrected visibilities", &cube_shape, corrected.shape())?;
        }
        check_shape(
            "imaging weights",
            &[num_chans, num_rows],
            self.imaging_weights.shape(),
        )?;
        check_len("row flags", num_rows, self.row_flags.len())?;
        check_len("UVWs", num_rows, self.uvws.len())?;
        check_len("phase delays", num_rows, self.phase_delays.len())?;
        check_len("frequencies", num_chans, self.freqs.len())?;

        if self.rows.start > self.rows.end || self.rows.end > num_rows {
            return Err(ResamplerError::BadRowRange {
                start: self.rows.start,
                end: self.rows.end,
                num_rows,
            });
        }
        Ok(())
    }

    /// Check that a model cube can be written to with this chunk's indices.
    pub(crate) fn validate_model(&self, model: &ArrayViewMut3<c32>) -> Result<(), ResamplerError> {
        check_shape("model visibilities", self.vis.shape(), model.shape())
    }
}

pub(crate) fn check_shape(
    what: &'static str,
    expected: &[usize],
    got: &[usize],
) -> Result<(), ResamplerError> {
    if expected == got {
        Ok(())
    } else {
        Err(ResamplerError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            got: got.to_vec(),
        })
    }
}

pub(crate) fn check_len(
    what: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), ResamplerError> {
    if expected == got {
        Ok(())
    } else {
        Err(ResamplerError::LengthMismatch {
            what,
            expected,
            got,
        })
    }
}

/// Owned visibility data that can lend [`VisChunk`]s.
#[derive(Debug, Clone)]
pub struct VisBuffer {
    pub uvws: Vec<UVW>,
    pub vis: Array3<c32>,
    pub corrected: Option<Array3<c32>>,
    pub model: Array3<c32>,
    pub flags: Array3<bool>,
    pub row_flags: Vec<bool>,
    pub imaging_weights: Array2<f32>,
    pub freqs: Vec<f64>,
    pub phase_delays: Vec<f64>,
}

impl VisBuffer {
    /// A buffer of zero-valued, unflagged visibilities with unit weights and
    /// no phase correction.
    pub fn new(uvws: Vec<UVW>, freqs: Vec<f64>, num_pols: usize) -> VisBuffer {
        let num_rows = uvws.len();
        let num_chans = freqs.len();
        let cube_dim = (num_pols, num_chans, num_rows);
        VisBuffer {
            uvws,
            vis: Array3::zeros(cube_dim),
            corrected: None,
            model: Array3::zeros(cube_dim),
            flags: Array3::from_elem(cube_dim, false),
            row_flags: vec![false; num_rows],
            imaging_weights: Array2::ones((num_chans, num_rows)),
            freqs,
            phase_delays: vec![0.0; num_rows],
        }
    }

    pub fn num_pols(&self) -> usize {
        self.vis.len_of(Axis(0))
    }

    pub fn num_chans(&self) -> usize {
        self.vis.len_of(Axis(1))
    }

    pub fn num_rows(&self) -> usize {
        self.vis.len_of(Axis(2))
    }

    /// Lend the rows `rows` of this buffer.
    pub fn chunk(&self, rows: Range<usize>) -> VisChunk<'_> {
        VisChunk {
            uvws: &self.uvws,
            vis: self.vis.view(),
            corrected: self.corrected.as_ref().map(|c| c.view()),
            flags: self.flags.view(),
            row_flags: &self.row_flags,
            imaging_weights: self.imaging_weights.view(),
            freqs: &self.freqs,
            phase_delays: &self.phase_delays,
            rows,
        }
    }

    /// Lend the rows `rows` of this buffer together with a mutable view of the
    /// model cube.
    pub fn chunk_with_model(
        &mut self,
        rows: Range<usize>,
    ) -> (VisChunk<'_>, ArrayViewMut3<'_, c32>) {
        let chunk = VisChunk {
            uvws: &self.uvws,
            vis: self.vis.view(),
            corrected: self.corrected.as_ref().map(|c| c.view()),
            flags: self.flags.view(),
            row_flags: &self.row_flags,
            imaging_weights: self.imaging_weights.view(),
            freqs: &self.freqs,
            phase_delays: &self.phase_delays,
            rows,
        };
        (chunk, self.model.view_mut())
    }
}

/// Partition `rows` into contiguous, disjoint ranges of at most `chunk_size`
/// rows. Only the last range may be shorter.
pub fn row_chunks(
    rows: Range<usize>,
    chunk_size: usize,
) -> Result<Vec<Range<usize>>, ResamplerError> {
    if chunk_size == 0 {
        return Err(ResamplerError::ZeroChunkSize);
    }
    let end = rows.end;
    Ok(rows
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(end))
        .collect())
}
