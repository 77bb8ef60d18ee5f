//! Convolution function lookup tables.
//!
//! A [`ConvFuncStore`] holds one oversampled, one-sided kernel table that is
//! used for both grid axes. Tap `i` of the table corresponds to an offset of
//! `i / sampling` grid cells from the kernel centre.

#[cfg(test)]
mod tests;

use log::trace;

use crate::ResamplerError;

/// An immutable, precomputed convolution function.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvFuncStore {
    /// The kernel samples. Index 0 is the kernel centre.
    data: Vec<f32>,

    /// The oversampling factor of `data` for the x and y axes.
    sampling: [usize; 2],

    /// The half-width of the kernel \[grid cells\] for the x and y axes.
    support: [usize; 2],
}

impl ConvFuncStore {
    /// Wrap an externally computed kernel table. The table must be long enough
    /// that every tap inside the support window (including the fractional
    /// offset) can be looked up.
    pub fn new(
        data: Vec<f32>,
        sampling: [usize; 2],
        support: [usize; 2],
    ) -> Result<ConvFuncStore, ResamplerError> {
        for (axis, (&samp, &supp)) in sampling.iter().zip(support.iter()).enumerate() {
            if samp == 0 {
                return Err(ResamplerError::ZeroSampling { axis });
            }
            let needed = min_table_len(supp, samp);
            if data.len() < needed {
                return Err(ResamplerError::ConvFuncTooShort {
                    len: data.len(),
                    support: supp,
                    sampling: samp,
                    needed,
                });
            }
        }
        trace!(
            "New convolution function: {} taps, sampling {sampling:?}, support {support:?}",
            data.len()
        );

        Ok(ConvFuncStore {
            data,
            sampling,
            support,
        })
    }

    /// A unit impulse: the centre tap is 1 and every other tap is 0. Gridding
    /// with this kernel is nearest-cell assignment.
    pub fn delta(support: usize, sampling: usize) -> Result<ConvFuncStore, ResamplerError> {
        let mut data = vec![0.0; table_len(support, sampling)];
        if let Some(centre) = data.first_mut() {
            *centre = 1.0;
        }
        ConvFuncStore::new(data, [sampling; 2], [support; 2])
    }

    /// The prolate spheroidal gridding function, tapered by `(1 - nu^2)`, where
    /// `nu` runs from 0 at the kernel centre to 1 at the edge of the support.
    pub fn spheroidal(support: usize, sampling: usize) -> Result<ConvFuncStore, ResamplerError> {
        if sampling == 0 {
            return Err(ResamplerError::ZeroSampling { axis: 0 });
        }
        let width = (support * sampling) as f64;
        let data = (0..table_len(support, sampling))
            .map(|i| {
                // A zero support leaves only the centre tap.
                let nu = if width > 0.0 { i as f64 / width } else { i as f64 };
                ((1.0 - nu * nu) * grdsf(nu)) as f32
            })
            .collect();
        ConvFuncStore::new(data, [sampling; 2], [support; 2])
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn sampling(&self) -> [usize; 2] {
        self.sampling
    }

    pub fn support(&self) -> [usize; 2] {
        self.support
    }

    /// The kernel value on `axis` for a whole-cell offset `delta` from the
    /// nearest grid cell, given the oversampled fractional offset `off` of the
    /// sample.
    #[inline]
    pub(crate) fn tap(&self, axis: usize, delta: i64, off: i64) -> f64 {
        let i = (self.sampling[axis] as i64 * delta + off).unsigned_abs() as usize;
        f64::from(self.data[i])
    }
}

/// The number of taps we generate for our own kernels; one spare cell beyond
/// the support.
fn table_len(support: usize, sampling: usize) -> usize {
    (support + 1) * sampling + 1
}

/// The smallest table that can serve `support` at `sampling`. A fractional
/// offset is rounded, so it can reach half a cell (rounded up) past the
/// support edge.
fn min_table_len(support: usize, sampling: usize) -> usize {
    support * sampling + (sampling + 1) / 2 + 1
}

/// Schwab's rational approximation of the spheroidal function (alpha = 1, m =
/// 6). Zero outside |nu| < 1.
pub(crate) fn grdsf(nu: f64) -> f64 {
    const P: [[f64; 5]; 2] = [
        [8.203343e-2, -3.644705e-1, 6.278660e-1, -5.335581e-1, 2.312756e-1],
        [4.028559e-3, -3.697768e-2, 1.021332e-1, -1.201436e-1, 6.412774e-2],
    ];
    const Q: [[f64; 3]; 2] = [[1.0, 8.212018e-1, 2.078043e-1], [1.0, 9.599102e-1, 2.918724e-1]];

    let abs_nu = nu.abs();
    let (part, nu_end) = if abs_nu < 0.75 {
        (0, 0.75)
    } else if abs_nu < 1.0 {
        (1, 1.0)
    } else {
        return 0.0;
    };

    let del_nu_sq = nu * nu - nu_end * nu_end;
    let top = P[part]
        .iter()
        .rev()
        .fold(0.0, |acc, &p| acc * del_nu_sq + p);
    let bot = Q[part]
        .iter()
        .rev()
        .fold(0.0, |acc, &q| acc * del_nu_sq + q);
    if bot == 0.0 {
        0.0
    } else {
        top / bot
    }
}
