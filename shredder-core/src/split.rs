//! Split an image into randomly assigned Voronoi shard canvases.

use std::ops::Range;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::compose::ShardCanvases;
use crate::pool::{batch_ranges, build_pool, default_workers, Progress};
use crate::raster::{build_patch, invert_rgb};
use crate::store::ImageStore;
use crate::voronoi::{generate_polygons, Polygon};
use crate::{Result, ShredderError};

/// Split parameters
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Voronoi seed points to draw
    pub points: usize,
    /// Number of shard canvases
    pub canvases: usize,
    /// Worker threads
    pub workers: usize,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Canvas file name prefix, followed by the canvas index
    pub prefix: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            points: 2000,
            canvases: 8,
            workers: default_workers(),
            seed: None,
            prefix: "canvas_".into(),
        }
    }
}

impl SplitOptions {
    pub fn validate(&self) -> Result<()> {
        if self.points < 1 {
            return Err(ShredderError::InvalidParameter(
                "point count must be at least 1".into(),
            ));
        }
        if self.canvases < 1 {
            return Err(ShredderError::InvalidParameter(
                "canvas count must be at least 1".into(),
            ));
        }
        if self.workers < 1 {
            return Err(ShredderError::InvalidParameter(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of an in-memory split
#[derive(Debug)]
pub struct SplitOutcome {
    /// Finished canvases, index `i` is shard `i`
    pub canvases: Vec<RgbImage>,
    /// Valid polygons composited
    pub polygons: usize,
    /// Worker batches dispatched
    pub batches: usize,
}

/// What [`split`] wrote
#[derive(Debug, Clone)]
pub struct SplitReport {
    /// Saved canvas files, index `i` is shard `i`
    pub paths: Vec<PathBuf>,
    /// Valid polygons composited
    pub polygons: usize,
    /// Worker batches dispatched
    pub batches: usize,
}

/// `<out_dir>/<prefix><index>.png`
pub fn canvas_path(out_dir: &Path, prefix: &str, index: usize) -> PathBuf {
    out_dir.join(format!("{}{}.png", prefix, index))
}

fn process_batch(
    polygons: &[Polygon],
    inverted: &RgbImage,
    canvases: &ShardCanvases,
    seed: u64,
    progress: &Progress<'_>,
) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut assignments = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        if let Some(patch) = build_patch(polygon, inverted) {
            assignments.push((rng.gen_range(0..canvases.len()), patch));
        }
        progress.advance(1);
    }

    canvases.apply(&assignments)?;
    progress.flush();
    Ok(())
}

/// Run every batch on a pool of `workers` threads. The first failing batch
/// aborts the run as a [`ShredderError::ProcessingFailure`].
fn dispatch(
    polygons: &[Polygon],
    ranges: &[Range<usize>],
    seeds: &[u64],
    inverted: &RgbImage,
    canvases: &ShardCanvases,
    workers: usize,
    progress: &Progress<'_>,
) -> Result<()> {
    let pool = build_pool(workers)?;
    pool.install(|| {
        ranges
            .par_iter()
            .zip(seeds.par_iter())
            .enumerate()
            .try_for_each(|(batch, (range, &seed))| {
                let items = &polygons[range.clone()];
                process_batch(items, inverted, canvases, seed, progress).map_err(|e| {
                    ShredderError::ProcessingFailure {
                        batch,
                        polygons: range.clone(),
                        reason: e.to_string(),
                    }
                })
            })
    })
}

fn shred(
    source: &RgbImage,
    options: &SplitOptions,
    progress: &Progress<'_>,
) -> Result<SplitOutcome> {
    options.validate()?;
    let (width, height) = source.dimensions();

    let mut rng = match options.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let polygons = generate_polygons(width, height, options.points, &mut rng)?;
    let inverted = invert_rgb(source);
    let canvases = ShardCanvases::new(options.canvases, width, height);

    let batch_size = (polygons.len() / (4 * options.workers)).max(1);
    let ranges = batch_ranges(polygons.len(), batch_size);
    // Per-batch assignment streams keep seeded runs independent of scheduling.
    let seeds: Vec<u64> = ranges.iter().map(|_| rng.gen()).collect();
    log::debug!(
        "split: {} polygons in {} batches of {} on {} workers",
        polygons.len(),
        ranges.len(),
        batch_size,
        options.workers,
    );

    progress.start(polygons.len());
    dispatch(
        &polygons,
        &ranges,
        &seeds,
        &inverted,
        &canvases,
        options.workers,
        progress,
    )?;

    Ok(SplitOutcome {
        canvases: canvases.into_images(),
        polygons: polygons.len(),
        batches: ranges.len(),
    })
}

/// Split `source` in memory. `progress` receives non-decreasing
/// percentages and ends at 100.
pub fn split_image<P>(
    source: &RgbImage,
    options: &SplitOptions,
    progress: P,
) -> Result<SplitOutcome>
where
    P: Fn(f64) + Sync,
{
    let progress = Progress::new(&progress);
    let outcome = shred(source, options, &progress)?;
    progress.finish();
    Ok(outcome)
}

/// Split the image at `source` and save canvas `i` to
/// [`canvas_path`]`(out_dir, prefix, i)`.
///
/// Canvases saved before a failure stay on disk.
pub fn split<S, P>(
    store: &S,
    source: &Path,
    out_dir: &Path,
    options: &SplitOptions,
    progress: P,
) -> Result<SplitReport>
where
    S: ImageStore + ?Sized,
    P: Fn(f64) + Sync,
{
    options.validate()?;
    let image = store.load(source)?.to_rgb8();

    let progress = Progress::new(&progress);
    let outcome = shred(&image, options, &progress)?;
    drop(image);

    let mut paths = Vec::with_capacity(outcome.canvases.len());
    for (index, canvas) in outcome.canvases.into_iter().enumerate() {
        let path = canvas_path(out_dir, &options.prefix, index);
        store.save(&DynamicImage::ImageRgb8(canvas), &path)?;
        log::info!("saved canvas {} to {:?}", index, path);
        paths.push(path);
    }

    progress.finish();
    Ok(SplitReport {
        paths,
        polygons: outcome.polygons,
        batches: outcome.batches,
    })
}
