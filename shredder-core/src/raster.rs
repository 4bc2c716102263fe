//! Polygon masks and the per-region RGBA patches cut from the inverted source.
//!
//! Masks and patches are cropped to the polygon's pixel bounding box and
//! carry that box's origin. Everything outside the box is implicitly 0
//! (mask) or fully transparent (patch).

use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::Polygon;

const INSIDE: u8 = 255;

/// Single-channel coverage mask
#[derive(Debug, Clone)]
pub struct Mask {
    /// Top-left pixel of `image` in source coordinates
    pub origin: (u32, u32),
    pub image: GrayImage,
}

impl Mask {
    /// Whether source pixel `(x, y)` is covered
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let (ox, oy) = self.origin;
        x >= ox
            && y >= oy
            && self
                .image
                .get_pixel_checked(x - ox, y - oy)
                .is_some_and(|p| p.0[0] == INSIDE)
    }

    /// Number of covered pixels
    pub fn area(&self) -> usize {
        self.image.pixels().filter(|p| p.0[0] == INSIDE).count()
    }
}

/// RGBA patch: opaque inside its polygon, transparent elsewhere
#[derive(Debug, Clone)]
pub struct Patch {
    /// Top-left pixel of `image` in source coordinates
    pub origin: (u32, u32),
    pub image: RgbaImage,
}

/// Replace every channel with `255 - value`.
pub fn invert_rgb(image: &RgbImage) -> RgbImage {
    let mut inverted = image.clone();
    image::imageops::invert(&mut inverted);
    inverted
}

/// Rasterize `polygon` on a `width` x `height` grid.
///
/// The polygon is filled and its outline drawn, so boundary pixels count
/// as inside. Returns `None` when the polygon has no vertices or misses
/// the grid entirely.
pub fn rasterize(polygon: &Polygon, width: u32, height: u32) -> Option<Mask> {
    let ((min_x, min_y), (max_x, max_y)) = polygon.bounds()?;
    let x0 = min_x.max(0);
    let y0 = min_y.max(0);
    let x1 = max_x.min(width as i32 - 1);
    let y1 = max_y.min(height as i32 - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }

    let mut image = GrayImage::new((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    let mut ring: Vec<Point<i32>> = polygon
        .points
        .iter()
        .map(|&(x, y)| Point::new(x - x0, y - y0))
        .collect();
    // Rounding can merge vertices; draw_polygon_mut needs an open ring.
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    if ring.len() >= 3 {
        draw_polygon_mut(&mut image, &ring, Luma([INSIDE]));
    } else {
        for (i, a) in ring.iter().enumerate() {
            let b = ring[(i + 1) % ring.len()];
            draw_line_segment_mut(
                &mut image,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                Luma([INSIDE]),
            );
        }
    }

    Some(Mask {
        origin: (x0 as u32, y0 as u32),
        image,
    })
}

/// Cut the region of `polygon` out of the pre-inverted source.
///
/// Covered pixels take the inverted source color at full opacity; the
/// rest of the patch stays transparent.
pub fn build_patch(polygon: &Polygon, inverted: &RgbImage) -> Option<Patch> {
    let mask = rasterize(polygon, inverted.width(), inverted.height())?;
    let (ox, oy) = mask.origin;

    let mut image = RgbaImage::new(mask.image.width(), mask.image.height());
    for (x, y, m) in mask.image.enumerate_pixels() {
        if m.0[0] == INSIDE {
            let Rgb([r, g, b]) = *inverted.get_pixel(ox + x, oy + y);
            image.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }

    Some(Patch {
        origin: mask.origin,
        image,
    })
}
