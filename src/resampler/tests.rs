use approx::assert_abs_diff_eq;
use marlu::constants::VEL_C;

use super::*;
use crate::{
    grid::GridShape,
    synthetic::{random_uvws, simulate_point_sources, PointSource},
    VisBuffer,
};

const N: usize = 64;

fn setup() -> (VisResampler, VisBuffer) {
    let sources = [
        PointSource {
            l: 0.0,
            m: 0.0,
            flux_density: 1.0,
        },
        PointSource {
            l: 0.05,
            m: -0.03,
            flux_density: 0.5,
        },
    ];
    let freqs = vec![150e6, 160e6, 170e6];
    // Baselines up to 20 wavelengths at the highest frequency.
    let max_baseline = 20.0 * VEL_C / 170e6;
    let mut buf = simulate_point_sources(&sources, random_uvws(200, max_baseline, 42), freqs, 2);
    buf.flags[(1, 2, 17)] = true;
    buf.row_flags[3] = true;

    let resampler = VisResampler::new(
        ConvFuncStore::spheroidal(3, 32).unwrap(),
        UvwTransform::for_image(N, N, 0.01),
        ChanPolMaps::identity(2, 3),
    );
    (resampler, buf)
}

fn assert_stores_eq(a: &GridStore<f64>, b: &GridStore<f64>) {
    for (x, y) in a.grid.iter().zip(b.grid.iter()) {
        assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-9);
        assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(a.sumwt, b.sumwt, epsilon = 1e-9);
}

#[test]
fn test_accessors_and_setters() {
    let (mut resampler, _) = setup();
    assert_eq!(resampler.conv_func().support(), [3, 3]);
    assert_eq!(resampler.maps(), &ChanPolMaps::identity(2, 3));

    resampler.set_conv_func(ConvFuncStore::delta(1, 8).unwrap());
    resampler.set_maps(ChanPolMaps::mfs(2, 3));
    let t = UvwTransform {
        scale: [2.0, 2.0],
        offset: [1.0, 1.0],
    };
    resampler.set_transform(t);
    assert_eq!(resampler.conv_func().sampling(), [8, 8]);
    assert_eq!(resampler.maps().chan_map, vec![Some(0); 3]);
    assert_eq!(resampler.transform(), t);
}

#[test]
fn test_sharded_gridding_matches_serial() {
    let (resampler, buf) = setup();
    let shape = GridShape::new(N, N, 2, 3);
    let chunk = buf.chunk(0..buf.num_rows());

    let mut serial = GridStore::new(shape);
    let serial_stats = resampler.grid_into(&mut serial, &chunk, false).unwrap();

    let mut sharded = GridStore::new(shape);
    let sharded_stats = resampler
        .grid_data_sharded(&mut sharded, &chunk, false, 17)
        .unwrap();

    assert_eq!(serial_stats, sharded_stats);
    assert_eq!(serial_stats.total(), 2 * 3 * 200);
    assert!(serial_stats.gridded > 0);
    assert_stores_eq(&serial, &sharded);
}

#[test]
fn test_sharded_gridding_adds_to_existing_grid() {
    let (resampler, buf) = setup();
    let shape = GridShape::new(N, N, 2, 3);

    let mut expected = GridStore::new(shape);
    resampler
        .grid_into(&mut expected, &buf.chunk(0..200), true)
        .unwrap();

    // Grid the first half serially, then the rest sharded on top.
    let mut store = GridStore::new(shape);
    resampler
        .grid_into(&mut store, &buf.chunk(0..100), true)
        .unwrap();
    resampler
        .grid_data_sharded(&mut store, &buf.chunk(100..200), true, 30)
        .unwrap();
    assert_stores_eq(&expected, &store);
}

#[test]
fn test_sharded_gridding_errors() {
    let (resampler, buf) = setup();
    let mut store = GridStore::<f32>::new(GridShape::new(N, N, 2, 3));
    assert_eq!(
        resampler.grid_data_sharded(&mut store, &buf.chunk(0..10), false, 0),
        Err(ResamplerError::ZeroChunkSize)
    );
    assert!(resampler
        .grid_data_sharded(&mut store, &buf.chunk(0..201), false, 10)
        .is_err());

    // No rows, no work.
    let stats = resampler
        .grid_data_sharded(&mut store, &buf.chunk(5..5), false, 10)
        .unwrap();
    assert_eq!(stats, GriddingStats::default());
    assert!(store.sumwt.iter().all(|&w| w == 0.0));
}

#[test]
fn test_shared_gridding_matches_serial() {
    let (resampler, buf) = setup();
    let shape = GridShape::new(N, N, 2, 3);
    let chunk = buf.chunk(0..buf.num_rows());

    let mut serial = GridStore::new(shape);
    resampler.grid_into(&mut serial, &chunk, false).unwrap();

    let shared = SharedGrid::new(shape);
    let ranges = row_chunks(0..buf.num_rows(), 50).unwrap();
    std::thread::scope(|s| {
        for rows in ranges {
            let chunk = chunk.with_rows(rows);
            let shared = &shared;
            let resampler = &resampler;
            s.spawn(move || resampler.grid_data_shared(shared, &chunk, false).unwrap());
        }
    });
    assert_stores_eq(&serial, &shared.into_inner());
}

#[test]
fn test_parallel_degridding_matches_serial() {
    let (resampler, mut buf) = setup();
    let shape = GridShape::new(N, N, 2, 3);
    let num_rows = buf.num_rows();
    let mut store = GridStore::<f64>::new(shape);
    resampler
        .grid_into(&mut store, &buf.chunk(0..num_rows), false)
        .unwrap();

    let serial_stats = {
        let (chunk, model) = buf.chunk_with_model(0..num_rows);
        resampler.degrid(model, store.grid.view(), &chunk).unwrap()
    };
    let serial_model = buf.model.clone();

    buf.model.fill(c32::default());
    let parallel_stats = {
        let (chunk, model) = buf.chunk_with_model(0..num_rows);
        resampler
            .degrid_parallel(model, store.grid.view(), &chunk, 13)
            .unwrap()
    };
    assert_eq!(serial_stats, parallel_stats);
    assert_eq!(serial_model, buf.model);

    let (chunk, model) = buf.chunk_with_model(0..num_rows);
    assert_eq!(
        resampler.degrid_parallel(model, store.grid.view(), &chunk, 0),
        Err(ResamplerError::ZeroChunkSize)
    );
}

#[test]
fn test_parallel_degridding_sub_range() {
    let (resampler, mut buf) = setup();
    let store = GridStore::<f32>::new(GridShape::new(N, N, 2, 3));
    let canary = c32::new(5.0, 5.0);
    buf.model.fill(canary);
    let (chunk, model) = buf.chunk_with_model(20..40);
    let stats = resampler
        .degrid_parallel(model, store.grid.view(), &chunk, 7)
        .unwrap();
    assert_eq!(stats.total(), 2 * 3 * 20);

    // Rows outside the range are untouched; inside, the zero grid gives zeros
    // where the visibility was used.
    assert!(buf.model.slice(s![.., .., ..20]).iter().all(|&m| m == canary));
    assert!(buf.model.slice(s![.., .., 40..]).iter().all(|&m| m == canary));
    let written = buf
        .model
        .slice(s![.., .., 20..40])
        .iter()
        .filter(|&&m| m == c32::default())
        .count();
    assert_eq!(written, stats.degridded);
}

#[test]
fn test_residuals_through_resampler() {
    let (resampler, mut buf) = setup();
    buf.model.assign(&buf.vis);
    let num_rows = buf.num_rows();
    let (chunk, model) = buf.chunk_with_model(0..num_rows);
    resampler.compute_residuals(model, &chunk, false).unwrap();
    assert!(buf.model.iter().all(|&m| m == c32::default()));
}
