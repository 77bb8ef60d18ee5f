//! Mapping visibility positions onto grid cells.


use std::f64::consts::TAU;

use marlu::{c64, constants::VEL_C, UVW};

use crate::{vis_chunk::check_len, ResamplerError};

/// The linear transform from a baseline \[wavelengths\] to a (fractional) grid
/// pixel: `pixel = scale * uv + offset`, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvwTransform {
    pub scale: [f64; 2],
    pub offset: [f64; 2],
}

impl UvwTransform {
    /// The usual transform for an `nx` by `ny` grid with square image-plane
    /// cells of `cell_size_rad` \[radians\]: the uv cell size is the inverse
    /// of the image field of view, and uv = 0 lands on the centre pixel.
    pub fn for_image(nx: usize, ny: usize, cell_size_rad: f64) -> UvwTransform {
        UvwTransform {
            scale: [nx as f64 * cell_size_rad, ny as f64 * cell_size_rad],
            offset: [(nx / 2) as f64, (ny / 2) as f64],
        }
    }
}

/// Which grid channel and grid polarisation each data channel and data
/// polarisation is gridded onto. `None`, or an index beyond the grid, excludes
/// the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanPolMaps {
    pub chan_map: Vec<Option<usize>>,
    pub pol_map: Vec<Option<usize>>,
}

impl ChanPolMaps {
    /// Every data channel and polarisation has its own grid plane.
    pub fn identity(num_pols: usize, num_chans: usize) -> ChanPolMaps {
        ChanPolMaps {
            chan_map: (0..num_chans).map(Some).collect(),
            pol_map: (0..num_pols).map(Some).collect(),
        }
    }

    /// Multi-frequency synthesis; all data channels go onto grid channel 0.
    pub fn mfs(num_pols: usize, num_chans: usize) -> ChanPolMaps {
        ChanPolMaps {
            chan_map: vec![Some(0); num_chans],
            pol_map: (0..num_pols).map(Some).collect(),
        }
    }

    /// Build maps from signed indices, where a negative index excludes the
    /// data.
    pub fn from_indices(chan_map: &[i32], pol_map: &[i32]) -> ChanPolMaps {
        let convert = |&i: &i32| usize::try_from(i).ok();
        ChanPolMaps {
            chan_map: chan_map.iter().map(convert).collect(),
            pol_map: pol_map.iter().map(convert).collect(),
        }
    }

    pub(crate) fn validate(&self, num_pols: usize, num_chans: usize) -> Result<(), ResamplerError> {
        check_len("channel map", num_chans, self.chan_map.len())?;
        check_len("polarisation map", num_pols, self.pol_map.len())
    }

    #[inline]
    pub fn grid_chan(&self, i_chan: usize, num_grid_chans: usize) -> Option<usize> {
        self.chan_map[i_chan].filter(|&c| c < num_grid_chans)
    }

    #[inline]
    pub fn grid_pol(&self, i_pol: usize, num_grid_pols: usize) -> Option<usize> {
        self.pol_map[i_pol].filter(|&p| p < num_grid_pols)
    }
}

/// Where a visibility lands on the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedSample {
    /// The nearest grid cell.
    pub loc: [i64; 2],

    /// The offset of the nearest cell from the exact position, in units of
    /// convolution-function taps.
    pub off: [i64; 2],

    /// The phase-centre correction for this visibility.
    pub phasor: c64,
}

/// Maps the samples of one chunk onto grid coordinates. Construction is cheap;
/// it only holds references.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper<'a> {
    pub(crate) uvws: &'a [UVW],
    pub(crate) freqs: &'a [f64],
    pub(crate) phase_delays: &'a [f64],
    pub(crate) transform: UvwTransform,
    pub(crate) sampling: [usize; 2],
}

impl<'a> CoordinateMapper<'a> {
    pub fn new(
        uvws: &'a [UVW],
        freqs: &'a [f64],
        phase_delays: &'a [f64],
        transform: UvwTransform,
        sampling: [usize; 2],
    ) -> CoordinateMapper<'a> {
        CoordinateMapper {
            uvws,
            freqs,
            phase_delays,
            transform,
            sampling,
        }
    }

    /// Get the grid location, the fractional offset and the phasor of the
    /// visibility on row `i_row`, channel `i_chan`.
    #[inline]
    pub fn map_sample(&self, i_row: usize, i_chan: usize) -> MappedSample {
        let freq = self.freqs[i_chan];
        let UVW { u, v, .. } = self.uvws[i_row];

        let mut loc = [0; 2];
        let mut off = [0; 2];
        for (axis, uv) in [u, v].into_iter().enumerate() {
            let pos = self.transform.scale[axis] * uv * freq / VEL_C + self.transform.offset[axis];
            let nearest = pos.round();
            if !nearest.is_finite() {
                // Nowhere on any grid; `on_grid` rejects this.
                loc[axis] = i64::MIN;
                continue;
            }
            // Saturates far beyond any grid.
            loc[axis] = nearest as i64;
            off[axis] = ((nearest - pos) * self.sampling[axis] as f64).round() as i64;
        }

        MappedSample {
            loc,
            off,
            phasor: phasor(self.phase_delays[i_row], freq),
        }
    }
}

/// The phase rotation for a delay of `dphase` \[metres\] at `freq` \[Hz\].
#[inline]
pub fn phasor(dphase: f64, freq: f64) -> c64 {
    if dphase == 0.0 {
        c64::new(1.0, 0.0)
    } else {
        c64::cis(-TAU * dphase * freq / VEL_C)
    }
}

/// Does the whole support window around `loc` fit on an `nx` by `ny` grid?
#[inline]
pub fn on_grid(loc: [i64; 2], support: [usize; 2], nx: usize, ny: usize) -> bool {
    let fits = |l: i64, s: usize, n: usize| {
        let (Ok(s), Ok(n)) = (i64::try_from(s), i64::try_from(n)) else {
            return false;
        };
        match (l.checked_sub(s), l.checked_add(s)) {
            (Some(low), Some(high)) => low >= 0 && high < n,
            _ => false,
        }
    };
    fits(loc[0], support[0], nx) && fits(loc[1], support[1], ny)
}
