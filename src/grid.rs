//! Grid types.
//!
//! A grid is a dense `[x][y][pol][chan]` array of complex values. Its
//! precision is chosen by the caller with [`GridFloat`]; accumulation is
//! always done in double precision before a value is stored.


use std::{
    fmt::Debug,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ndarray::prelude::*;
use num_complex::Complex;
use num_traits::{Float, NumAssign};

use crate::{vis_chunk::check_shape, ResamplerError};

/// A complex grid with `F` precision.
pub type Grid<F> = Array4<Complex<F>>;

/// The accumulated weights of each `[pol][chan]` grid plane.
pub type SumOfWeights = Array2<f64>;

/// The floating-point types a grid can be stored with.
pub trait GridFloat: Float + NumAssign + Debug + Send + Sync + 'static {
    fn from_f64(v: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl GridFloat for f32 {
    #[inline]
    fn from_f64(v: f64) -> f32 {
        v as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl GridFloat for f64 {
    #[inline]
    fn from_f64(v: f64) -> f64 {
        v
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

/// The extents of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub num_pols: usize,
    pub num_chans: usize,
}

impl GridShape {
    pub fn new(nx: usize, ny: usize, num_pols: usize, num_chans: usize) -> GridShape {
        GridShape {
            nx,
            ny,
            num_pols,
            num_chans,
        }
    }

    pub fn of<F: GridFloat>(grid: &ArrayView4<Complex<F>>) -> GridShape {
        let (nx, ny, num_pols, num_chans) = grid.dim();
        GridShape::new(nx, ny, num_pols, num_chans)
    }

    pub fn dim(&self) -> (usize, usize, usize, usize) {
        (self.nx, self.ny, self.num_pols, self.num_chans)
    }

    pub fn sumwt_dim(&self) -> (usize, usize) {
        (self.num_pols, self.num_chans)
    }

    /// Check that a sum-of-weights array belongs to a grid of this shape.
    pub(crate) fn check_sumwt(&self, sumwt_shape: &[usize]) -> Result<(), ResamplerError> {
        check_shape(
            "sum of weights",
            &[self.num_pols, self.num_chans],
            sumwt_shape,
        )
    }
}

/// A grid together with its sum of weights.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStore<F: GridFloat> {
    pub grid: Grid<F>,
    pub sumwt: SumOfWeights,
}

impl<F: GridFloat> GridStore<F> {
    /// A zeroed grid and sum of weights.
    pub fn new(shape: GridShape) -> GridStore<F> {
        GridStore {
            grid: Array4::zeros(shape.dim()),
            sumwt: Array2::zeros(shape.sumwt_dim()),
        }
    }

    pub fn shape(&self) -> GridShape {
        GridShape::of(&self.grid.view())
    }

    /// Zero everything, ready for a new gridding pass.
    pub fn clear(&mut self) {
        self.grid.fill(Complex::new(F::zero(), F::zero()));
        self.sumwt.fill(0.0);
    }

    /// Add another store of the same shape into this one. Nothing is added if
    /// either store's sum of weights doesn't match its grid.
    pub fn accumulate(&mut self, other: &GridStore<F>) -> Result<(), ResamplerError> {
        check_shape("grid", self.grid.shape(), other.grid.shape())?;
        let shape = self.shape();
        shape.check_sumwt(self.sumwt.shape())?;
        shape.check_sumwt(other.sumwt.shape())?;
        self.grid += &other.grid;
        self.sumwt += &other.sumwt;
        Ok(())
    }
}

/// A grid that several threads may grid into. Mutation is only possible
/// through the guard returned by [`SharedGrid::lock`]; the lock is released
/// when the guard is dropped.
#[derive(Debug)]
pub struct SharedGrid<F: GridFloat> {
    inner: Mutex<GridStore<F>>,
}

impl<F: GridFloat> SharedGrid<F> {
    pub fn new(shape: GridShape) -> SharedGrid<F> {
        SharedGrid::from(GridStore::new(shape))
    }

    /// Acquire the grid for mutation.
    pub fn lock(&self) -> MutexGuard<'_, GridStore<F>> {
        // A panic while gridding leaves the grid partially accumulated, but
        // not in an invalid state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> GridStore<F> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: GridFloat> From<GridStore<F>> for SharedGrid<F> {
    fn from(store: GridStore<F>) -> SharedGrid<F> {
        SharedGrid {
            inner: Mutex::new(store),
        }
    }
}
