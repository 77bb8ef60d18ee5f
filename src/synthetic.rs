//! Synthetic visibilities of point sources, for driving and testing the
//! resampler without a measurement set.

use std::f64::consts::TAU;

use log::debug;
use marlu::{c32, c64, constants::VEL_C, UVW};
use ndarray::{parallel::prelude::*, prelude::*};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::VisBuffer;

/// An unpolarised point source with direction cosines `l` and `m` relative to
/// the phase centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSource {
    pub l: f64,
    pub m: f64,

    /// \[Jy\]
    pub flux_density: f64,
}

/// `num_rows` baselines with `u` and `v` uniformly distributed within
/// `max_baseline` \[metres\] of the origin. The same `seed` always gives the
/// same baselines.
pub fn random_uvws(num_rows: usize, max_baseline: f64, seed: u64) -> Vec<UVW> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut uvws = Vec::with_capacity(num_rows);
    while uvws.len() < num_rows {
        let u = rng.gen_range(-max_baseline..=max_baseline);
        let v = rng.gen_range(-max_baseline..=max_baseline);
        if u.hypot(v) <= max_baseline {
            uvws.push(UVW { u, v, w: 0.0 });
        }
    }
    uvws
}

/// Make a buffer of the visibilities of `sources` at `uvws` and `freqs`
/// \[Hz\]. Every polarisation sees the full flux density. `w` terms are
/// ignored.
pub fn simulate_point_sources(
    sources: &[PointSource],
    uvws: Vec<UVW>,
    freqs: Vec<f64>,
    num_pols: usize,
) -> VisBuffer {
    debug!(
        "Simulating {} point sources over {} rows and {} channels",
        sources.len(),
        uvws.len(),
        freqs.len()
    );
    let mut buf = VisBuffer::new(uvws, freqs, num_pols);
    let freqs = &buf.freqs;

    buf.vis
        .axis_iter_mut(Axis(2))
        .into_par_iter()
        .zip(buf.uvws.par_iter())
        .for_each(|(mut vis_pc, &UVW { u, v, .. })| {
            for (mut vis_p, &freq) in vis_pc.axis_iter_mut(Axis(1)).zip(freqs) {
                let (u, v) = (u * freq / VEL_C, v * freq / VEL_C);
                let value: c64 = sources
                    .iter()
                    .map(|src| c64::cis(-TAU * (u * src.l + v * src.m)) * src.flux_density)
                    .sum();
                vis_p.fill(c32::new(value.re as f32, value.im as f32));
            }
        });

    buf
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_random_uvws_are_deterministic() {
        let a = random_uvws(50, 100.0, 7);
        let b = random_uvws(50, 100.0, 7);
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
        assert!(a.iter().all(|uvw| uvw.u.hypot(uvw.v) <= 100.0));
        assert_ne!(a, random_uvws(50, 100.0, 8));
    }

    #[test]
    fn test_source_at_phase_centre() {
        let src = PointSource {
            l: 0.0,
            m: 0.0,
            flux_density: 2.5,
        };
        let uvws = random_uvws(10, 500.0, 1);
        let buf = simulate_point_sources(&[src], uvws, vec![150e6, 200e6], 2);
        assert_eq!(buf.vis.dim(), (2, 2, 10));
        for v in buf.vis.iter() {
            assert_abs_diff_eq!(v.re, 2.5);
            assert_abs_diff_eq!(v.im, 0.0);
        }
    }

    #[test]
    fn test_offset_source_phase() {
        // u = 1 wavelength at l = 0.25 is a quarter turn.
        let src = PointSource {
            l: 0.25,
            m: 0.0,
            flux_density: 1.0,
        };
        let uvws = vec![UVW {
            u: 1.0,
            v: 0.0,
            w: 0.0,
        }];
        let buf = simulate_point_sources(&[src], uvws, vec![VEL_C], 1);
        let v = buf.vis[(0, 0, 0)];
        assert_abs_diff_eq!(v.re, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v.im, -1.0, epsilon = 1e-6);
    }
}
