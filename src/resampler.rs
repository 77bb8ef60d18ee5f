//! The resampler: gridding, degridding and residuals with a fixed convolution
//! function, uv transform and channel/polarisation maps.

#[cfg(test)]
mod tests;

use log::debug;
use marlu::c32;
use ndarray::{parallel::prelude::*, prelude::*};
use num_complex::Complex;

use crate::{
    conv_func::ConvFuncStore,
    degridding::{degrid_rows, grid_to_data, DegriddingStats},
    grid::{GridFloat, GridStore, SharedGrid},
    gridding::{data_to_grid, GriddingStats},
    mapper::{ChanPolMaps, UvwTransform},
    residuals::compute_residuals,
    vis_chunk::row_chunks,
    ResamplerError, VisChunk,
};

#[derive(Debug, Clone)]
pub struct VisResampler {
    cf: ConvFuncStore,
    transform: UvwTransform,
    maps: ChanPolMaps,
}

impl VisResampler {
    pub fn new(cf: ConvFuncStore, transform: UvwTransform, maps: ChanPolMaps) -> VisResampler {
        VisResampler {
            cf,
            transform,
            maps,
        }
    }

    pub fn conv_func(&self) -> &ConvFuncStore {
        &self.cf
    }

    pub fn transform(&self) -> UvwTransform {
        self.transform
    }

    pub fn maps(&self) -> &ChanPolMaps {
        &self.maps
    }

    pub fn set_conv_func(&mut self, cf: ConvFuncStore) {
        self.cf = cf;
    }

    pub fn set_transform(&mut self, transform: UvwTransform) {
        self.transform = transform;
    }

    pub fn set_maps(&mut self, maps: ChanPolMaps) {
        self.maps = maps;
    }

    /// Grid the chunk's visibilities (or, with `do_psf`, its weights) onto
    /// `grid` and `sumwt`. See [`data_to_grid`].
    pub fn grid_data<F: GridFloat>(
        &self,
        grid: ArrayViewMut4<Complex<F>>,
        sumwt: ArrayViewMut2<f64>,
        chunk: &VisChunk,
        do_psf: bool,
    ) -> Result<GriddingStats, ResamplerError> {
        data_to_grid(
            grid,
            sumwt,
            chunk,
            do_psf,
            &self.cf,
            &self.maps,
            self.transform,
        )
    }

    /// [`VisResampler::grid_data`] onto a [`GridStore`].
    pub fn grid_into<F: GridFloat>(
        &self,
        store: &mut GridStore<F>,
        chunk: &VisChunk,
        do_psf: bool,
    ) -> Result<GriddingStats, ResamplerError> {
        let GridStore { grid, sumwt } = store;
        self.grid_data(grid.view_mut(), sumwt.view_mut(), chunk, do_psf)
    }

    /// Grid onto a grid that other threads may also be gridding onto. The
    /// grid is locked for the whole call.
    pub fn grid_data_shared<F: GridFloat>(
        &self,
        shared: &SharedGrid<F>,
        chunk: &VisChunk,
        do_psf: bool,
    ) -> Result<GriddingStats, ResamplerError> {
        let mut guard = shared.lock();
        self.grid_into(&mut guard, chunk, do_psf)
    }

    /// Grid the chunk's rows in parallel. The rows are split into ranges of
    /// `chunk_size` rows; each rayon worker grids its ranges onto a private
    /// grid, and the private grids are summed onto `store` at the end. `store`
    /// is untouched if any range fails.
    pub fn grid_data_sharded<F: GridFloat>(
        &self,
        store: &mut GridStore<F>,
        chunk: &VisChunk,
        do_psf: bool,
        chunk_size: usize,
    ) -> Result<GriddingStats, ResamplerError> {
        chunk.validate()?;
        self.maps.validate(chunk.num_pols(), chunk.num_chans())?;
        let ranges = row_chunks(chunk.rows.clone(), chunk_size)?;
        let shape = store.shape();
        debug!(
            "Gridding rows {:?} in {} ranges onto private grids",
            chunk.rows,
            ranges.len()
        );

        let result = ranges
            .into_par_iter()
            .try_fold(
                || (GridStore::<F>::new(shape), GriddingStats::default()),
                |(mut local, mut stats), rows| {
                    stats += self.grid_into(&mut local, &chunk.with_rows(rows), do_psf)?;
                    Ok::<_, ResamplerError>((local, stats))
                },
            )
            .try_reduce_with(|(mut a, mut a_stats), (b, b_stats)| {
                a.accumulate(&b)?;
                a_stats += b_stats;
                Ok((a, a_stats))
            });

        match result {
            Some(result) => {
                let (partial, stats) = result?;
                store.accumulate(&partial)?;
                Ok(stats)
            }
            // No rows.
            None => Ok(GriddingStats::default()),
        }
    }

    /// Predict the chunk's visibilities from `grid` into `model`. See
    /// [`grid_to_data`].
    pub fn degrid<F: GridFloat>(
        &self,
        model: ArrayViewMut3<c32>,
        grid: ArrayView4<Complex<F>>,
        chunk: &VisChunk,
    ) -> Result<DegriddingStats, ResamplerError> {
        grid_to_data(model, grid, chunk, &self.cf, &self.maps, self.transform)
    }

    /// [`VisResampler::degrid`], with the rows split into ranges of
    /// `chunk_size` that are degridded in parallel. The grid is only read, and
    /// each range writes only its own rows of `model`.
    pub fn degrid_parallel<F: GridFloat>(
        &self,
        mut model: ArrayViewMut3<c32>,
        grid: ArrayView4<Complex<F>>,
        chunk: &VisChunk,
        chunk_size: usize,
    ) -> Result<DegriddingStats, ResamplerError> {
        chunk.validate()?;
        chunk.validate_model(&model)?;
        self.maps.validate(chunk.num_pols(), chunk.num_chans())?;
        if chunk_size == 0 {
            return Err(ResamplerError::ZeroChunkSize);
        }
        debug!(
            "Degridding rows {:?} in parallel ranges of {chunk_size} rows",
            chunk.rows
        );

        let first_row = chunk.rows.start;
        let stats = model
            .slice_mut(s![.., .., chunk.rows.clone()])
            .axis_chunks_iter_mut(Axis(2), chunk_size)
            .into_par_iter()
            .enumerate()
            .map(|(i_range, model_rows)| {
                let start = first_row + i_range * chunk_size;
                let rows = start..start + model_rows.len_of(Axis(2));
                degrid_rows(
                    model_rows,
                    grid,
                    &chunk.with_rows(rows),
                    &self.cf,
                    &self.maps,
                    self.transform,
                )
            })
            .reduce(DegriddingStats::default, |mut a, b| {
                a += b;
                a
            });
        Ok(stats)
    }

    /// Subtract the observed (or corrected) visibilities from `model`. See
    /// [`compute_residuals`].
    pub fn compute_residuals(
        &self,
        model: ArrayViewMut3<c32>,
        chunk: &VisChunk,
        use_corrected: bool,
    ) -> Result<(), ResamplerError> {
        compute_residuals(model, chunk, use_corrected)
    }
}
