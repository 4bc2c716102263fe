//! Voronoi image shredder CLI
//!
//! Splits an image into shard canvases, each holding a random subset of
//! the inverted image's Voronoi cells, and merges shard-like images back
//! into one composite.
//!
//! ## YAML job file
//!
//! ```yaml
//! points: 2000
//! canvases: 8
//! workers: 8
//! seed: 42
//! prefix: canvas_
//! invert: true
//! threshold: 240
//! ```
//!
//! Every key is optional; flags given on the command line win.
//!
//!   shredder split -i photo.jpg -o shards/ --config job.yaml --canvases 4
//!   shredder merge shards/canvas_*.png -o restored.png --invert

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use shredder_core::{merge, split, FileStore, MergeOptions, SplitOptions, DEFAULT_THRESHOLD};

/// YAML job file format, shared by both subcommands
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobConfig {
    #[serde(default)]
    points: Option<usize>,
    #[serde(default)]
    canvases: Option<usize>,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    invert: Option<bool>,
    #[serde(default)]
    threshold: Option<u8>,
}

fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job file: {:?}", path))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse job file: {:?}", path))
}

fn load_optional_config(path: Option<&PathBuf>) -> anyhow::Result<JobConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(JobConfig::default()),
    }
}

#[derive(Parser, Debug)]
#[command(name = "shredder")]
#[command(about = "Shred images into Voronoi shards and merge them back", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split an image into shard canvases
    Split(SplitArgs),
    /// Merge images into one composite, first input at the bottom
    Merge(MergeArgs),
}

#[derive(clap::Args, Debug)]
struct SplitArgs {
    /// Input image path
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the canvas files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of Voronoi seed points [default: 2000]
    #[arg(short = 'k', long)]
    points: Option<usize>,

    /// Number of shard canvases [default: 8]
    #[arg(short = 'n', long)]
    canvases: Option<usize>,

    /// Worker threads [default: 2 x CPUs, at most 16]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Random seed for a reproducible split (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Canvas file name prefix [default: canvas_]
    #[arg(long)]
    prefix: Option<String>,

    /// YAML job file (command-line flags override it)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct MergeArgs {
    /// Images to merge, bottom to top
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file path
    #[arg(short, long, default_value = "final_composite.png")]
    output: PathBuf,

    /// Re-invert colors after removing the white background
    #[arg(long)]
    invert: bool,

    /// Channel value at or above which a pixel becomes transparent [default: 240]
    #[arg(long)]
    threshold: Option<u8>,

    /// Worker threads [default: 2 x CPUs, at most 16]
    #[arg(short, long)]
    workers: Option<usize>,

    /// YAML job file (command-line flags override it)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn percent_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

fn split_options(args: &SplitArgs, config: JobConfig) -> SplitOptions {
    let defaults = SplitOptions::default();
    SplitOptions {
        points: args.points.or(config.points).unwrap_or(defaults.points),
        canvases: args.canvases.or(config.canvases).unwrap_or(defaults.canvases),
        workers: args.workers.or(config.workers).unwrap_or(defaults.workers),
        seed: args.seed.or(config.seed),
        prefix: args.prefix.clone().or(config.prefix).unwrap_or(defaults.prefix),
    }
}

fn merge_options(args: &MergeArgs, config: JobConfig) -> MergeOptions {
    MergeOptions {
        invert: args.invert || config.invert.unwrap_or(false),
        threshold: args.threshold.or(config.threshold).unwrap_or(DEFAULT_THRESHOLD),
        workers: args
            .workers
            .or(config.workers)
            .unwrap_or_else(shredder_core::default_workers),
    }
}

fn run_split(args: SplitArgs) -> anyhow::Result<()> {
    let config = load_optional_config(args.config.as_ref())?;
    let options = split_options(&args, config);
    log::debug!("resolved split options: {:?}", options);

    println!("Loading image: {:?}", args.input);
    let (width, height) = image::image_dimensions(&args.input)
        .with_context(|| format!("failed to read image: {:?}", args.input))?;
    println!("Image size: {}x{}", width, height);
    match options.seed {
        Some(seed) => println!("Using seed: {}", seed),
        None => println!("Using random seed"),
    }
    println!(
        "Splitting into {} canvases with {} points on {} workers",
        options.canvases, options.points, options.workers
    );

    let bar = percent_bar()?;
    let start = Instant::now();
    let report = split(&FileStore, &args.input, &args.out_dir, &options, |p| {
        bar.set_position(p.round() as u64)
    })
    .with_context(|| format!("failed to split {:?}", args.input))?;
    bar.finish_and_clear();

    println!(
        "Composited {} cells ({} discarded) in {} batches, {:.1}s",
        report.polygons,
        options.points.saturating_sub(report.polygons),
        report.batches,
        start.elapsed().as_secs_f64()
    );
    for path in &report.paths {
        println!("Wrote {:?}", path);
    }
    Ok(())
}

fn run_merge(args: MergeArgs) -> anyhow::Result<()> {
    let config = load_optional_config(args.config.as_ref())?;
    let options = merge_options(&args, config);
    log::debug!("resolved merge options: {:?}", options);

    println!(
        "Merging {} images (threshold {}, invert {}) on {} workers",
        args.inputs.len(),
        options.threshold,
        options.invert,
        options.workers
    );

    let bar = percent_bar()?;
    let start = Instant::now();
    merge(&FileStore, &args.inputs, &args.output, &options, |p| {
        bar.set_position(p.round() as u64)
    })
    .context("failed to merge images")?;
    bar.finish_and_clear();

    println!(
        "Output saved to: {:?} ({:.1}s)",
        args.output,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Split(args) => run_split(args),
        Command::Merge(args) => run_merge(args),
    }
}
