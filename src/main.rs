use std::thread::scope;

use clap::{AppSettings, ArgEnum, Parser};
use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use marlu::constants::VEL_C;
use ndarray::prelude::*;
use thiserror::Error;
use vec1::{vec1, Vec1};

use vis_resampler::{
    row_chunks,
    synthetic::{random_uvws, simulate_point_sources, PointSource},
    ChanPolMaps, ConvFuncStore, DegriddingStats, GridFloat, GridShape, GridStore, GriddingStats,
    ResamplerError, UvwTransform, VisBuffer, VisResampler,
};

#[derive(Debug, Clone, Copy, ArgEnum)]
enum Kernel {
    Delta,
    Spheroidal,
}

#[derive(Debug, Clone, Copy, ArgEnum)]
enum Precision {
    Single,
    Double,
}

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// The number of cells on each side of the (square) grid.
    #[clap(short, long, default_value = "512")]
    grid_size: usize,

    /// The angular size of an image pixel \[arcseconds\].
    #[clap(long, default_value = "30")]
    cell_size: f64,

    /// The number of visibility rows (baselines) to simulate.
    #[clap(short = 'r', long, default_value = "16384")]
    num_rows: usize,

    #[clap(short = 'c', long, default_value = "16")]
    num_chans: usize,

    #[clap(short = 'p', long, default_value = "2")]
    num_pols: usize,

    /// The frequency of the first channel \[MHz\].
    #[clap(long, default_value = "150")]
    freq_start: f64,

    /// The channel width \[kHz\].
    #[clap(long, default_value = "80")]
    freq_res: f64,

    /// Point sources to simulate, each as "l,m,flux_density". The default is
    /// a single 1 Jy source at the phase centre.
    #[clap(long = "source", parse(try_from_str = parse_source), multiple_occurrences(true))]
    sources: Vec<PointSource>,

    /// Seed for the random uv coverage.
    #[clap(long, default_value = "1")]
    seed: u64,

    /// The half-width of the convolution function \[cells\].
    #[clap(long, default_value = "3")]
    support: usize,

    /// The number of convolution-function samples per cell.
    #[clap(long, default_value = "128")]
    sampling: usize,

    #[clap(long, arg_enum, default_value = "spheroidal")]
    kernel: Kernel,

    /// The precision of the grid.
    #[clap(long, arg_enum, default_value = "double")]
    precision: Precision,

    /// Grid all channels onto a single plane.
    #[clap(long)]
    mfs: bool,

    /// Grid the weights (the PSF) rather than the visibilities. No degridding
    /// is done.
    #[clap(long)]
    psf: bool,

    /// The number of rows handed to the gridder at a time.
    #[clap(long, default_value = "1024")]
    chunk_size: usize,

    /// The number of worker threads. The default is one per CPU.
    #[clap(short = 'j', long)]
    num_threads: Option<usize>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

#[derive(Error, Debug)]
enum DriverError {
    #[error("The grid ({grid_size} cells) is too small for a convolution function with support {support}")]
    GridTooSmall { grid_size: usize, support: usize },

    #[error("At least one channel is needed")]
    NoChannels,

    #[error("A cell size of {cell_size}\" and a highest frequency of {max_freq} Hz give an unusable maximum baseline ({max_baseline} m)")]
    BadBaseline {
        cell_size: f64,
        max_freq: f64,
        max_baseline: f64,
    },

    #[error("The gridding thread panicked")]
    GridderPanic,

    #[error(transparent)]
    Resampler(#[from] ResamplerError),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn parse_source(s: &str) -> Result<PointSource, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{s}': {e}"))?;
    match values.as_slice() {
        &[l, m, flux_density] => Ok(PointSource { l, m, flux_density }),
        _ => Err(format!("'{s}': expected 'l,m,flux_density'")),
    }
}

/// The largest baseline \[wavelengths, metres\] whose support window stays on
/// the grid at every frequency.
fn uv_coverage_limits(
    grid_size: usize,
    support: usize,
    cell_size: f64,
    freqs: &[f64],
) -> Result<(f64, f64), DriverError> {
    let usable_half_width = (grid_size / 2).saturating_sub(support + 1);
    if usable_half_width == 0 {
        return Err(DriverError::GridTooSmall { grid_size, support });
    }
    let max_freq = freqs
        .iter()
        .copied()
        .reduce(f64::max)
        .ok_or(DriverError::NoChannels)?;

    let cell_size_rad = (cell_size / 3600.0).to_radians();
    let max_uv = usable_half_width as f64 / (grid_size as f64 * cell_size_rad);
    let max_baseline = max_uv * VEL_C / max_freq;
    if !(max_baseline.is_finite() && max_baseline > 0.0) {
        return Err(DriverError::BadBaseline {
            cell_size,
            max_freq,
            max_baseline,
        });
    }
    Ok((max_uv, max_baseline))
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), DriverError> {
    let args = Args::parse();
    setup_logging(args.verbosity);

    if let Some(num_threads) = args.num_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()?;
    }
    debug!("Using {} threads", rayon::current_num_threads());

    let cell_size_rad = (args.cell_size / 3600.0).to_radians();
    let freqs: Vec<f64> = (0..args.num_chans)
        .map(|i| args.freq_start * 1e6 + i as f64 * args.freq_res * 1e3)
        .collect();
    let (max_uv, max_baseline) =
        uv_coverage_limits(args.grid_size, args.support, args.cell_size, &freqs)?;
    info!(
        "Grid: {0}x{0} cells of {1}\", {2} channels from {3} MHz",
        args.grid_size, args.cell_size, args.num_chans, args.freq_start
    );
    info!("Baselines up to {max_baseline:.1} m ({max_uv:.1} wavelengths)");

    let sources = Vec1::try_from_vec(args.sources.clone()).unwrap_or_else(|_| {
        vec1![PointSource {
            l: 0.0,
            m: 0.0,
            flux_density: 1.0,
        }]
    });
    for src in &sources {
        debug!("Source: {src:?}");
    }

    let mut buf = simulate_point_sources(
        &sources,
        random_uvws(args.num_rows, max_baseline, args.seed),
        freqs,
        args.num_pols,
    );

    let cf = match args.kernel {
        Kernel::Delta => ConvFuncStore::delta(args.support, args.sampling)?,
        Kernel::Spheroidal => ConvFuncStore::spheroidal(args.support, args.sampling)?,
    };
    let (maps, num_grid_chans) = if args.mfs {
        (ChanPolMaps::mfs(args.num_pols, args.num_chans), 1)
    } else {
        (ChanPolMaps::identity(args.num_pols, args.num_chans), args.num_chans)
    };
    let resampler = VisResampler::new(
        cf,
        UvwTransform::for_image(args.grid_size, args.grid_size, cell_size_rad),
        maps,
    );
    let shape = GridShape::new(args.grid_size, args.grid_size, args.num_pols, num_grid_chans);

    match args.precision {
        Precision::Single => run::<f32>(&args, &resampler, &mut buf, shape),
        Precision::Double => run::<f64>(&args, &resampler, &mut buf, shape),
    }
}

fn run<F: GridFloat>(
    args: &Args,
    resampler: &VisResampler,
    buf: &mut VisBuffer,
    shape: GridShape,
) -> Result<(), DriverError> {
    let ranges = row_chunks(0..buf.num_rows(), args.chunk_size)?;
    let mut store = GridStore::<F>::new(shape);
    info!(
        "Gridding {} rows in {} chunks onto a {:?} grid",
        buf.num_rows(),
        ranges.len(),
        shape.dim()
    );

    let multi_progress = MultiProgress::with_draw_target(if args.no_progress_bars {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stdout()
    });
    let style = ProgressStyle::default_bar()
        .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} chunks ({elapsed_precise}<{eta_precise})")
        .unwrap()
        .progress_chars("=> ");
    let read_progress = multi_progress.add(
        ProgressBar::new(ranges.len() as _)
            .with_style(style.clone())
            .with_position(0)
            .with_message("Reading"),
    );
    let grid_progress = multi_progress.add(
        ProgressBar::new(ranges.len() as _)
            .with_style(style)
            .with_position(0)
            .with_message("Gridding"),
    );
    read_progress.tick();
    grid_progress.tick();

    let (tx, rx) = bounded(5);
    let error = AtomicCell::new(false);
    // Each chunk is itself gridded in parallel, in shards small enough to keep
    // every thread busy.
    let shard_size = (args.chunk_size / rayon::current_num_threads()).max(1);

    let grid_result = scope(|s| {
        let chunks = &*buf;
        let ranges = &ranges;
        let error = &error;
        s.spawn(move || {
            for rows in ranges {
                if error.load() {
                    break;
                }
                // The gridder has gone away if this fails.
                if tx.send(chunks.chunk(rows.clone())).is_err() {
                    break;
                }
                read_progress.inc(1);
            }
            read_progress.abandon_with_message("Finished reading");
        });

        let store = &mut store;
        let gridder = s.spawn(move || {
            let mut stats = GriddingStats::default();
            for chunk in rx.iter() {
                match resampler.grid_data_sharded(store, &chunk, args.psf, shard_size) {
                    Ok(chunk_stats) => stats += chunk_stats,
                    Err(e) => {
                        error.store(true);
                        return Err(e);
                    }
                }
                grid_progress.inc(1);
            }
            grid_progress.abandon_with_message("Finished gridding");
            Ok(stats)
        });
        gridder.join()
    });
    let grid_stats = grid_result.map_err(|_| DriverError::GridderPanic)??;
    report_gridding(&grid_stats, &store);

    if args.psf {
        return Ok(());
    }

    // Normalise each plane by its weights before predicting from it.
    for ((i_pol, i_chan), &weight) in store.sumwt.indexed_iter() {
        if weight > 0.0 {
            let norm = F::from_f64(weight);
            store
                .grid
                .slice_mut(s![.., .., i_pol, i_chan])
                .mapv_inplace(|v| v / norm);
        }
    }

    let num_rows = buf.num_rows();
    let (chunk, model) = buf.chunk_with_model(0..num_rows);
    let degrid_stats = resampler.degrid_parallel(model, store.grid.view(), &chunk, shard_size)?;
    report_degridding(&degrid_stats);

    let (chunk, model) = buf.chunk_with_model(0..num_rows);
    resampler.compute_residuals(model, &chunk, false)?;
    let amps = buf.model.iter().map(|r| r.norm()).collect::<Vec<_>>();
    let rms = (amps.iter().map(|a| a * a).sum::<f32>() / amps.len().max(1) as f32).sqrt();
    info!("Residual RMS: {rms:.6} Jy");
    if let Some((min, max)) = amps.iter().minmax_by(|a, b| a.total_cmp(b)).into_option() {
        debug!("Residual amplitudes: {min:.6} to {max:.6} Jy");
    }

    Ok(())
}

fn report_gridding<F: GridFloat>(stats: &GriddingStats, store: &GridStore<F>) {
    info!(
        "Gridded {} samples ({} flagged, {} excluded, {} off grid)",
        stats.gridded, stats.flagged, stats.excluded, stats.off_grid
    );
    if stats.off_grid > 0 {
        warn!("{} samples fell off the grid", stats.off_grid);
    }
    for (i_pol, sumwt) in store.sumwt.outer_iter().enumerate() {
        if let Some((min, max)) = sumwt.iter().minmax_by(|a, b| a.total_cmp(b)).into_option() {
            info!("Pol {i_pol} sum of weights: {min:.3} to {max:.3}");
        }
    }
}

fn report_degridding(stats: &DegriddingStats) {
    info!(
        "Degridded {} samples ({} flagged, {} excluded, {} off grid)",
        stats.degridded, stats.flagged, stats.excluded, stats.off_grid
    );
    if stats.degenerate > 0 {
        warn!(
            "{} samples had a zero kernel sum and were set to zero",
            stats.degenerate
        );
    }
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
