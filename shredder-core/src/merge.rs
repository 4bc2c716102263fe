//! Merge shard-like images back into one composite.

use std::path::Path;

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::pool::{build_pool, default_workers, Progress};
use crate::store::ImageStore;
use crate::{Result, ShredderError};

/// Channel value at or above which a pixel counts as background
pub const DEFAULT_THRESHOLD: u8 = 240;

/// Merge parameters
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Re-invert colors after transparency extraction
    pub invert: bool,
    /// Near-white cutoff, see [`extract_transparency`]
    pub threshold: u8,
    /// Worker threads
    pub workers: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            invert: false,
            threshold: DEFAULT_THRESHOLD,
            workers: default_workers(),
        }
    }
}

impl MergeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(ShredderError::InvalidParameter(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Make pixels whose R, G and B are all `>= threshold` fully transparent.
/// Other pixels keep their alpha.
pub fn extract_transparency(image: &mut RgbaImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        if pixel[0] >= threshold && pixel[1] >= threshold && pixel[2] >= threshold {
            pixel[3] = 0;
        }
    }
}

/// Replace each color channel with `255 - value`, alpha untouched.
pub fn invert_colors(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        *pixel = Rgba([255 - r, 255 - g, 255 - b, a]);
    }
}

fn prepare_layer(image: &mut RgbaImage, options: &MergeOptions) {
    extract_transparency(image, options.threshold);
    if options.invert {
        invert_colors(image);
    }
}

/// Composite `layers` in order onto a transparent `width` x `height`
/// canvas; the last layer ends up on top.
pub fn composite_layers(width: u32, height: u32, layers: &[RgbaImage]) -> RgbaImage {
    let mut result = RgbaImage::new(width, height);
    for layer in layers {
        imageops::overlay(&mut result, layer, 0, 0);
    }
    result
}

fn check_dimensions(
    labels: impl Iterator<Item = String>,
    layers: &[RgbaImage],
) -> Result<(u32, u32)> {
    let expected = layers
        .first()
        .map(|l| l.dimensions())
        .ok_or_else(|| ShredderError::InvalidParameter("merge needs at least one image".into()))?;

    for (label, layer) in labels.zip(layers) {
        if layer.dimensions() != expected {
            return Err(ShredderError::DimensionMismatch {
                input: label,
                expected,
                actual: layer.dimensions(),
            });
        }
    }
    Ok(expected)
}

fn blend(
    mut layers: Vec<RgbaImage>,
    (width, height): (u32, u32),
    options: &MergeOptions,
    progress: &Progress<'_>,
) -> Result<RgbaImage> {
    let batch_size = (layers.len() / options.workers).max(1);
    log::debug!(
        "merge: {} layers in batches of {} on {} workers",
        layers.len(),
        batch_size,
        options.workers,
    );

    // Only the per-layer filters run in parallel; chunks keep their order.
    progress.start(layers.len());
    let pool = build_pool(options.workers)?;
    pool.install(|| {
        layers.par_chunks_mut(batch_size).for_each(|batch| {
            for layer in batch.iter_mut() {
                prepare_layer(layer, options);
            }
            progress.advance(batch.len());
            progress.flush();
        })
    });

    Ok(composite_layers(width, height, &layers))
}

/// Merge in-memory layers. Layer 0 is composited first, so later layers
/// cover earlier ones where both are opaque.
pub fn merge_images<P>(
    layers: Vec<RgbaImage>,
    options: &MergeOptions,
    progress: P,
) -> Result<RgbaImage>
where
    P: Fn(f64) + Sync,
{
    options.validate()?;
    let size = check_dimensions((0..).map(|i| format!("image #{}", i)), &layers)?;

    let progress = Progress::new(&progress);
    let merged = blend(layers, size, options, &progress)?;
    progress.finish();
    Ok(merged)
}

/// Load `sources` in order, merge them, and save the composite to `output`.
///
/// Nothing is written when loading or the dimension check fails.
pub fn merge<S, P, Q>(
    store: &S,
    sources: &[Q],
    output: &Path,
    options: &MergeOptions,
    progress: P,
) -> Result<()>
where
    S: ImageStore + ?Sized,
    P: Fn(f64) + Sync,
    Q: AsRef<Path>,
{
    options.validate()?;
    if sources.is_empty() {
        return Err(ShredderError::InvalidParameter(
            "merge needs at least one image".into(),
        ));
    }

    let layers = sources
        .iter()
        .map(|path| Ok(store.load(path.as_ref())?.to_rgba8()))
        .collect::<Result<Vec<_>>>()?;
    let size = check_dimensions(
        sources.iter().map(|p| p.as_ref().display().to_string()),
        &layers,
    )?;

    let progress = Progress::new(&progress);
    let merged = blend(layers, size, options, &progress)?;
    store.save(&DynamicImage::ImageRgba8(merged), output)?;
    log::info!("saved composite of {} images to {:?}", sources.len(), output);

    progress.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{split_image, SplitOptions};
    use crate::store::testing::MemoryStore;
    use image::RgbImage;
    use std::path::PathBuf;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn options(invert: bool) -> MergeOptions {
        MergeOptions {
            invert,
            workers: 3,
            ..MergeOptions::default()
        }
    }

    /// White image with an opaque `color` square at `[x0, x0 + 10)^2`.
    fn square_on_white(x0: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_fn(30, 30, |x, y| {
            if (x0..x0 + 10).contains(&x) && (x0..x0 + 10).contains(&y) {
                color
            } else {
                WHITE
            }
        })
    }

    #[test]
    fn test_threshold_boundary() {
        let mut image = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => Rgba([240, 240, 240, 255]),
            1 => Rgba([239, 239, 239, 255]),
            _ => Rgba([250, 239, 250, 255]),
        });
        extract_transparency(&mut image, DEFAULT_THRESHOLD);

        assert_eq!(*image.get_pixel(0, 0), Rgba([240, 240, 240, 0]));
        assert_eq!(*image.get_pixel(1, 0), Rgba([239, 239, 239, 255]));
        assert_eq!(*image.get_pixel(2, 0), Rgba([250, 239, 250, 255]));
    }

    #[test]
    fn test_partial_alpha_kept_for_colored_pixels() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([10, 200, 30, 77]));
        extract_transparency(&mut image, DEFAULT_THRESHOLD);
        assert_eq!(*image.get_pixel(0, 0), Rgba([10, 200, 30, 77]));
    }

    #[test]
    fn test_invert_keeps_alpha() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([0, 100, 255, 42]));
        invert_colors(&mut image);
        assert_eq!(*image.get_pixel(0, 0), Rgba([255, 155, 0, 42]));
    }

    #[test]
    fn test_merge_is_order_sensitive() {
        let a = square_on_white(5, RED);
        let b = square_on_white(10, BLUE);

        let ab = merge_images(vec![a.clone(), b.clone()], &options(false), |_| {}).unwrap();
        let ba = merge_images(vec![b, a], &options(false), |_| {}).unwrap();

        // (12, 12) is inside both squares.
        assert_eq!(*ab.get_pixel(12, 12), BLUE);
        assert_eq!(*ba.get_pixel(12, 12), RED);
        assert_ne!(ab, ba);

        // Outside the overlap both orders agree, and white became clear.
        assert_eq!(*ab.get_pixel(6, 6), RED);
        assert_eq!(*ba.get_pixel(6, 6), RED);
        assert_eq!(*ab.get_pixel(0, 29), CLEAR);
    }

    #[test]
    fn test_composite_layers_blends_partial_alpha() {
        let bottom = RgbaImage::from_pixel(2, 1, BLUE);
        let top = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([255, 0, 0, 128]) } else { CLEAR }
        });
        let out = composite_layers(2, 1, &[bottom, top]);

        let mixed = out.get_pixel(0, 0);
        assert!((127..=128).contains(&mixed[0]), "unexpected mix {:?}", mixed);
        assert!((126..=128).contains(&mixed[2]), "unexpected mix {:?}", mixed);
        assert!(mixed[3] >= 254);
        assert_eq!(*out.get_pixel(1, 0), BLUE);
    }

    #[test]
    fn test_merge_single_image() {
        let merged = merge_images(vec![square_on_white(0, RED)], &options(false), |_| {}).unwrap();
        assert_eq!(*merged.get_pixel(0, 0), RED);
        assert_eq!(merged.get_pixel(20, 20)[3], 0);
    }

    #[test]
    fn test_merge_rejects_empty_input() {
        assert!(matches!(
            merge_images(Vec::new(), &options(false), |_| {}),
            Err(ShredderError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_merge_dimension_mismatch() {
        let err = merge_images(
            vec![RgbaImage::new(4, 4), RgbaImage::new(4, 4), RgbaImage::new(5, 4)],
            &options(false),
            |_| {},
        )
        .unwrap_err();

        match err {
            ShredderError::DimensionMismatch { input, expected, actual } => {
                assert_eq!(input, "image #2");
                assert_eq!(expected, (4, 4));
                assert_eq!(actual, (5, 4));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_merge_mismatch_writes_nothing() {
        let store = MemoryStore::default();
        let inputs = [PathBuf::from("a.png"), PathBuf::from("b.png")];
        store
            .save(&DynamicImage::ImageRgba8(RgbaImage::new(8, 8)), &inputs[0])
            .unwrap();
        store
            .save(&DynamicImage::ImageRgba8(RgbaImage::new(8, 9)), &inputs[1])
            .unwrap();

        let output = Path::new("merged.png");
        let err = merge(&store, &inputs, output, &options(false), |_| {}).unwrap_err();

        assert!(matches!(err, ShredderError::DimensionMismatch { .. }));
        assert!(!store.images().contains_key(output));
    }

    #[test]
    fn test_merge_saves_composite() {
        let store = MemoryStore::default();
        let inputs: Vec<PathBuf> = (0..5)
            .map(|i| PathBuf::from(format!("shard_{}.png", i)))
            .collect();
        for (i, path) in inputs.iter().enumerate() {
            let layer = square_on_white(i as u32 * 4, if i % 2 == 0 { RED } else { BLUE });
            store.save(&DynamicImage::ImageRgba8(layer), path).unwrap();
        }

        let seen = parking_lot::Mutex::new(Vec::new());
        let output = Path::new("out/final.png");
        merge(&store, &inputs, output, &options(false), |p| seen.lock().push(p)).unwrap();

        let merged = store.images()[output].to_rgba8();
        assert_eq!(merged.dimensions(), (30, 30));
        // Layer 4 (red, at 16..26) is on top of layer 3 (blue, at 12..22).
        assert_eq!(*merged.get_pixel(17, 17), RED);
        assert_eq!(*merged.get_pixel(13, 13), BLUE);
        assert_eq!(seen.lock().last().copied(), Some(100.0));
    }

    #[test]
    fn test_split_then_merge_restores_colors() {
        let source = RgbImage::from_pixel(60, 60, image::Rgb([200, 30, 90]));
        let split = split_image(
            &source,
            &SplitOptions {
                points: 40,
                canvases: 4,
                workers: 2,
                seed: Some(11),
                ..SplitOptions::default()
            },
            |_| {},
        )
        .unwrap();

        let layers: Vec<RgbaImage> = split
            .canvases
            .iter()
            .map(|c| DynamicImage::ImageRgb8(c.clone()).to_rgba8())
            .collect();
        let merged = merge_images(layers, &options(true), |_| {}).unwrap();

        let mut restored = 0;
        for pixel in merged.pixels() {
            if pixel[3] == 255 {
                assert_eq!(*pixel, Rgba([200, 30, 90, 255]));
                restored += 1;
            } else {
                assert_eq!(pixel[3], 0);
            }
        }
        assert!(restored > 0);
    }
}
