//! Core image shredding library.
//!
//! Splits an image into shard canvases keyed by a random Voronoi
//! tessellation (Rayon-parallelized), and merges shard-like images back
//! into a single composite.

mod compose;
mod geometry;
mod merge;
mod pool;
mod raster;
mod site;
mod split;
mod store;
mod voronoi;

use std::ops::Range;
use std::path::PathBuf;

pub use compose::{composite_patch, source_over, ShardCanvases};
pub use geometry::{clip, is_simple_non_empty, signed_area, Rect};
pub use merge::{
    composite_layers, extract_transparency, invert_colors, merge, merge_images, MergeOptions,
    DEFAULT_THRESHOLD,
};
pub use pool::{batch_ranges, default_workers};
pub use raster::{build_patch, invert_rgb, rasterize, Mask, Patch};
pub use site::{random_positions, Position};
pub use split::{canvas_path, split, split_image, SplitOptions, SplitOutcome, SplitReport};
pub use store::{FileStore, ImageStore};
pub use voronoi::{generate_polygons, CellVertex, Polygon, VoronoiDiagram};

/// RGB color tuple
pub type Rgb = [u8; 3];

/// Error type for shredding operations
#[derive(Debug, thiserror::Error)]
pub enum ShredderError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{input} is {}x{}, expected {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    DimensionMismatch {
        input: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Batch {batch} (items {}..{}) failed: {reason}", .polygons.start, .polygons.end)]
    ProcessingFailure {
        batch: usize,
        polygons: Range<usize>,
        reason: String,
    },

    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, ShredderError>;
