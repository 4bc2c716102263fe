//! Seed points for the tessellation.

use rand::Rng;

/// 2D position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared distance to another position
    pub fn dist_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Z component of `(a - self) x (b - self)`
    pub fn cross(&self, a: &Position, b: &Position) -> f64 {
        (a.x - self.x) * (b.y - self.y) - (a.y - self.y) * (b.x - self.x)
    }

    /// Dot product of `(a - self)` and `(b - self)`
    pub fn dot(&self, a: &Position, b: &Position) -> f64 {
        (a.x - self.x) * (b.x - self.x) + (a.y - self.y) * (b.y - self.y)
    }
}

/// Draw `count` positions uniformly from `[0, width) x [0, height)`.
pub fn random_positions<R: Rng + ?Sized>(
    count: usize,
    width: f64,
    height: f64,
    rng: &mut R,
) -> Vec<Position> {
    (0..count)
        .map(|_| Position::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height)))
        .collect()
}
