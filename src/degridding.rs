//! Degridding: predicting visibilities from a grid.


use std::ops::AddAssign;

use log::{debug, trace};
use marlu::{c32, c64};
use ndarray::prelude::*;
use num_complex::Complex;

use crate::{
    conv_func::ConvFuncStore,
    grid::{GridFloat, GridShape},
    mapper::{on_grid, ChanPolMaps, CoordinateMapper, UvwTransform},
    ResamplerError, VisChunk,
};

/// How the visibilities of a degridding call were used. Counted the same way
/// as [`crate::GriddingStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DegriddingStats {
    /// Model visibilities that were written.
    pub degridded: usize,

    /// Model visibilities that were written as zero, because the convolution
    /// function summed to zero over their support window.
    pub degenerate: usize,

    pub flagged: usize,

    pub excluded: usize,

    pub off_grid: usize,
}

impl DegriddingStats {
    pub fn total(&self) -> usize {
        self.degridded + self.degenerate + self.flagged + self.excluded + self.off_grid
    }
}

impl AddAssign for DegriddingStats {
    fn add_assign(&mut self, rhs: DegriddingStats) {
        self.degridded += rhs.degridded;
        self.degenerate += rhs.degenerate;
        self.flagged += rhs.flagged;
        self.excluded += rhs.excluded;
        self.off_grid += rhs.off_grid;
    }
}

/// Interpolate `grid` (`[x][y][pol][chan]`) onto the positions of the
/// visibilities in `chunk`, writing the results into `model` (the same shape
/// as the chunk's visibility cube). Visibilities that are flagged, unmapped or
/// too close to the grid edge leave `model` untouched.
///
/// A visibility whose convolution weights sum to zero is written as zero
/// rather than dividing by zero.
pub fn grid_to_data<F: GridFloat>(
    mut model: ArrayViewMut3<c32>,
    grid: ArrayView4<Complex<F>>,
    chunk: &VisChunk,
    cf: &ConvFuncStore,
    maps: &ChanPolMaps,
    transform: UvwTransform,
) -> Result<DegriddingStats, ResamplerError> {
    chunk.validate()?;
    chunk.validate_model(&model)?;
    maps.validate(chunk.num_pols(), chunk.num_chans())?;
    debug!(
        "Degridding rows {:?} ({} chans, {} pols) from a {:?} grid",
        chunk.rows,
        chunk.num_chans(),
        chunk.num_pols(),
        grid.dim()
    );

    let model_rows = model.slice_mut(s![.., .., chunk.rows.clone()]);
    let stats = degrid_rows(model_rows, grid, chunk, cf, maps, transform);
    trace!("Degridding stats: {stats:?}");
    Ok(stats)
}

/// Degrid the chunk's rows into `model_rows`, whose row axis starts at
/// `chunk.rows.start`. The inputs must already be validated.
pub(crate) fn degrid_rows<F: GridFloat>(
    mut model_rows: ArrayViewMut3<c32>,
    grid: ArrayView4<Complex<F>>,
    chunk: &VisChunk,
    cf: &ConvFuncStore,
    maps: &ChanPolMaps,
    transform: UvwTransform,
) -> DegriddingStats {
    let shape = GridShape::of(&grid);
    let num_pols = chunk.num_pols();
    let num_chans = chunk.num_chans();
    let mapper = CoordinateMapper::new(
        chunk.uvws,
        chunk.freqs,
        chunk.phase_delays,
        transform,
        cf.sampling(),
    );
    let support = cf.support();
    let [support_x, support_y] = support.map(|s| s as i64);
    let mut stats = DegriddingStats::default();

    for (i_row, mut model_pc) in chunk
        .rows
        .clone()
        .zip(model_rows.axis_iter_mut(Axis(2)))
    {
        if chunk.row_flags[i_row] {
            stats.flagged += num_pols * num_chans;
            continue;
        }

        for i_chan in 0..num_chans {
            let weight = chunk.imaging_weights[(i_chan, i_row)];
            let grid_chan = match maps.grid_chan(i_chan, shape.num_chans) {
                Some(c) if weight != 0.0 => c,
                _ => {
                    stats.excluded += num_pols;
                    continue;
                }
            };

            let sample = mapper.map_sample(i_row, i_chan);
            if !on_grid(sample.loc, support, shape.nx, shape.ny) {
                stats.off_grid += num_pols;
                continue;
            }
            let phasor_conj = sample.phasor.conj();

            for i_pol in 0..num_pols {
                if chunk.flags[(i_pol, i_chan, i_row)] {
                    stats.flagged += 1;
                    continue;
                }
                let grid_pol = match maps.grid_pol(i_pol, shape.num_pols) {
                    Some(p) => p,
                    None => {
                        stats.excluded += 1;
                        continue;
                    }
                };

                let plane = grid.slice(s![.., .., grid_pol, grid_chan]);
                let mut value = c64::default();
                let mut norm = 0.0;
                for dy in -support_y..=support_y {
                    let wy = cf.tap(1, dy, sample.off[1]);
                    let y = (sample.loc[1] + dy) as usize;
                    for dx in -support_x..=support_x {
                        let wt = cf.tap(0, dx, sample.off[0]) * wy;
                        let x = (sample.loc[0] + dx) as usize;
                        let cell = plane[(x, y)];
                        value += c64::new(cell.re.as_f64(), cell.im.as_f64()) * wt;
                        norm += wt;
                    }
                }

                let model = &mut model_pc[(i_pol, i_chan)];
                if norm == 0.0 {
                    *model = c32::default();
                    stats.degenerate += 1;
                } else {
                    let value = value * phasor_conj / norm;
                    *model = c32::new(value.re as f32, value.im as f32);
                    stats.degridded += 1;
                }
            }
        }
    }

    stats
}
