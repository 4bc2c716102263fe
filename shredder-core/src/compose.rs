//! Source-over compositing and the shared shard canvases.

use image::{Pixel, Rgb, RgbImage, Rgba};
use parking_lot::Mutex;

use crate::raster::Patch;
use crate::{Result, ShredderError};

const WHITE: crate::Rgb = [255, 255, 255];

/// Porter-Duff "over" for straight (non-premultiplied) alpha.
pub fn source_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let mut out = dst;
    out.blend(&src);
    out
}

/// Composite `patch` over `canvas` in place.
///
/// The canvas is opaque, so every blended pixel stays opaque and the
/// alpha channel can be dropped again.
pub fn composite_patch(canvas: &mut RgbImage, patch: &Patch) -> Result<()> {
    let (ox, oy) = patch.origin;
    let (pw, ph) = patch.image.dimensions();
    if ox + pw > canvas.width() || oy + ph > canvas.height() {
        return Err(ShredderError::InvalidParameter(format!(
            "patch {}x{} at ({}, {}) exceeds {}x{} canvas",
            pw,
            ph,
            ox,
            oy,
            canvas.width(),
            canvas.height()
        )));
    }

    for (x, y, src) in patch.image.enumerate_pixels() {
        let dst = canvas.get_pixel_mut(ox + x, oy + y);
        *dst = source_over(*src, dst.to_rgba()).to_rgb();
    }
    Ok(())
}

/// The `N` output canvases of a split, shared by all workers.
///
/// One lock guards the whole set; workers take it once per batch.
pub struct ShardCanvases {
    count: usize,
    canvases: Mutex<Vec<RgbImage>>,
}

impl ShardCanvases {
    /// `count` opaque white canvases of `width` x `height`
    pub fn new(count: usize, width: u32, height: u32) -> Self {
        let canvases = (0..count)
            .map(|_| RgbImage::from_pixel(width, height, Rgb(WHITE)))
            .collect();
        Self {
            count,
            canvases: Mutex::new(canvases),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Composite a batch of `(canvas index, patch)` assignments in order.
    /// Patches landing on the same canvas accumulate.
    pub fn apply(&self, assignments: &[(usize, Patch)]) -> Result<()> {
        let mut canvases = self.canvases.lock();
        for (index, patch) in assignments {
            let canvas = canvases.get_mut(*index).ok_or_else(|| {
                ShredderError::InvalidParameter(format!(
                    "canvas index {} out of range for {} canvases",
                    index, self.count
                ))
            })?;
            composite_patch(canvas, patch)?;
        }
        Ok(())
    }

    pub fn into_images(self) -> Vec<RgbImage> {
        self.canvases.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn patch_at(origin: (u32, u32), size: (u32, u32), color: Rgba<u8>) -> Patch {
        Patch {
            origin,
            image: RgbaImage::from_pixel(size.0, size.1, color),
        }
    }

    #[test]
    fn test_source_over_extremes() {
        let red = Rgba([255, 0, 0, 255]);
        let blue = Rgba([0, 0, 255, 255]);
        assert_eq!(source_over(red, blue), red);
        assert_eq!(source_over(Rgba([9, 9, 9, 0]), blue), blue);
        assert_eq!(source_over(Rgba([0, 0, 0, 0]), Rgba([0, 0, 0, 0])), Rgba([0, 0, 0, 0]));
    }

    fn assert_close(actual: Rgba<u8>, expected: [u8; 4]) {
        for (a, e) in actual.0.iter().zip(expected) {
            assert!((*a as i32 - e as i32).abs() <= 1, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_source_over_half_alpha() {
        let out = source_over(Rgba([255, 0, 0, 128]), Rgba([0, 0, 255, 255]));
        assert_close(out, [128, 0, 127, 255]);
    }

    #[test]
    fn test_source_over_onto_transparent_keeps_color() {
        let out = source_over(Rgba([10, 20, 30, 100]), Rgba([0, 0, 0, 0]));
        assert_close(out, [10, 20, 30, 100]);
    }

    #[test]
    fn test_half_alpha_patch_mixes_with_canvas() {
        let mut canvas = RgbImage::from_pixel(2, 2, Rgb(WHITE));
        let patch = patch_at((0, 0), (1, 1), Rgba([0, 0, 0, 128]));
        composite_patch(&mut canvas, &patch).unwrap();

        let Rgb([r, g, b]) = *canvas.get_pixel(0, 0);
        for c in [r, g, b] {
            assert!((126..=128).contains(&c), "unexpected mix {:?}", canvas.get_pixel(0, 0));
        }
        assert_eq!(*canvas.get_pixel(1, 1), Rgb(WHITE));
    }

    #[test]
    fn test_composite_patch_copies_opaque_pixels() {
        let mut canvas = RgbImage::from_pixel(8, 8, Rgb(WHITE));
        let mut patch = patch_at((2, 2), (3, 3), Rgba([0, 255, 255, 255]));
        patch.image.put_pixel(1, 1, Rgba([0, 0, 0, 0]));

        composite_patch(&mut canvas, &patch).unwrap();

        assert_eq!(*canvas.get_pixel(2, 2), Rgb([0, 255, 255]));
        assert_eq!(*canvas.get_pixel(3, 3), Rgb(WHITE));
        assert_eq!(*canvas.get_pixel(4, 4), Rgb([0, 255, 255]));
        assert_eq!(*canvas.get_pixel(5, 5), Rgb(WHITE));
    }

    #[test]
    fn test_composite_patch_out_of_bounds() {
        let mut canvas = RgbImage::from_pixel(4, 4, Rgb(WHITE));
        let patch = patch_at((3, 3), (2, 2), Rgba([0, 0, 0, 255]));
        assert!(composite_patch(&mut canvas, &patch).is_err());
    }

    #[test]
    fn test_batch_composites_accumulate() {
        let canvases = ShardCanvases::new(2, 6, 6);
        let assignments = vec![
            (0, patch_at((0, 0), (3, 3), Rgba([255, 0, 0, 255]))),
            (0, patch_at((2, 2), (3, 3), Rgba([0, 0, 255, 255]))),
        ];
        canvases.apply(&assignments).unwrap();

        let images = canvases.into_images();
        assert_eq!(*images[0].get_pixel(0, 0), Rgb([255, 0, 0]));
        // Overlap shows the later patch, earlier content survives elsewhere.
        assert_eq!(*images[0].get_pixel(2, 2), Rgb([0, 0, 255]));
        assert_eq!(*images[0].get_pixel(4, 4), Rgb([0, 0, 255]));
        assert!(images[1].pixels().all(|p| *p == Rgb(WHITE)));
    }

    #[test]
    fn test_apply_rejects_bad_index() {
        let canvases = ShardCanvases::new(1, 4, 4);
        let assignments = vec![(3, patch_at((0, 0), (1, 1), Rgba([0, 0, 0, 255])))];
        assert!(canvases.apply(&assignments).is_err());
    }
}
