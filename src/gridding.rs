//! Gridding: accumulating visibilities onto a grid.


use std::ops::AddAssign;

use log::{debug, trace};
use marlu::c64;
use ndarray::prelude::*;
use num_complex::Complex;

use crate::{
    conv_func::ConvFuncStore,
    grid::{GridFloat, GridShape},
    mapper::{on_grid, ChanPolMaps, CoordinateMapper, UvwTransform},
    promote, ResamplerError, VisChunk,
};

/// How the visibilities of a gridding call were used. Every visibility in the
/// chunk's row range is counted exactly once, by the first check that rejects
/// it (row flag, channel weight and map, grid bounds, then flag and
/// polarisation map).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GriddingStats {
    /// Visibilities that were accumulated onto the grid.
    pub gridded: usize,

    /// Visibilities skipped because of a row or visibility flag.
    pub flagged: usize,

    /// Visibilities with zero weight, or whose channel or polarisation isn't
    /// mapped onto the grid.
    pub excluded: usize,

    /// Visibilities whose support window doesn't fit on the grid.
    pub off_grid: usize,
}

impl GriddingStats {
    pub fn total(&self) -> usize {
        self.gridded + self.flagged + self.excluded + self.off_grid
    }
}

impl AddAssign for GriddingStats {
    fn add_assign(&mut self, rhs: GriddingStats) {
        self.gridded += rhs.gridded;
        self.flagged += rhs.flagged;
        self.excluded += rhs.excluded;
        self.off_grid += rhs.off_grid;
    }
}

/// Accumulate the visibilities of `chunk` onto `grid` (`[x][y][pol][chan]`),
/// and their weights onto `sumwt` (`[pol][chan]`).
///
/// If `do_psf` is true, the imaging weights alone are gridded (at the
/// visibility positions), producing the point-spread-function grid.
///
/// Nothing is written if the inputs don't agree on their shapes. A grid
/// shared between threads must be locked for the duration of this call (see
/// [`crate::SharedGrid`]).
pub fn data_to_grid<F: GridFloat>(
    mut grid: ArrayViewMut4<Complex<F>>,
    mut sumwt: ArrayViewMut2<f64>,
    chunk: &VisChunk,
    do_psf: bool,
    cf: &ConvFuncStore,
    maps: &ChanPolMaps,
    transform: UvwTransform,
) -> Result<GriddingStats, ResamplerError> {
    chunk.validate()?;
    let shape = GridShape::of(&grid.view());
    shape.check_sumwt(sumwt.shape())?;
    let num_pols = chunk.num_pols();
    let num_chans = chunk.num_chans();
    maps.validate(num_pols, num_chans)?;
    debug!(
        "Gridding rows {:?} ({num_chans} chans, {num_pols} pols) onto a {:?} grid (PSF: {do_psf})",
        chunk.rows,
        shape.dim()
    );

    let mapper = CoordinateMapper::new(
        chunk.uvws,
        chunk.freqs,
        chunk.phase_delays,
        transform,
        cf.sampling(),
    );
    let support = cf.support();
    let [support_x, support_y] = support.map(|s| s as i64);
    let mut stats = GriddingStats::default();

    for i_row in chunk.rows.clone() {
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

                let weight = f64::from(weight);
                let value = if do_psf {
                    c64::new(weight, 0.0)
                } else {
                    promote(chunk.vis[(i_pol, i_chan, i_row)]) * sample.phasor * weight
                };

                let mut plane = grid.slice_mut(s![.., .., grid_pol, grid_chan]);
                let mut norm = 0.0;
                for dy in -support_y..=support_y {
                    let wy = cf.tap(1, dy, sample.off[1]);
                    let y = (sample.loc[1] + dy) as usize;
                    for dx in -support_x..=support_x {
                        let wt = cf.tap(0, dx, sample.off[0]) * wy;
                        let x = (sample.loc[0] + dx) as usize;
                        let contribution = value * wt;
                        plane[(x, y)] += Complex::new(
                            F::from_f64(contribution.re),
                            F::from_f64(contribution.im),
                        );
                        norm += wt;
                    }
                }
                sumwt[(grid_pol, grid_chan)] += weight * norm;
                stats.gridded += 1;
            }
        }
    }

    trace!("Gridding stats: {stats:?}");
    Ok(stats)
}
