//! Polygon clipping and validity tests.

use crate::Position;

const EPSILON: f64 = 1e-9;

/// Axis-aligned clip rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Position,
    pub max: Position,
}

impl Rect {
    pub fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// `[0, width] x [0, height]`
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(Position::new(0.0, 0.0), Position::new(width, height))
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Top, Side::Bottom];

    fn inside(self, rect: &Rect, p: &Position) -> bool {
        match self {
            Side::Left => p.x >= rect.min.x,
            Side::Right => p.x <= rect.max.x,
            Side::Top => p.y >= rect.min.y,
            Side::Bottom => p.y <= rect.max.y,
        }
    }

    /// Crossing of segment `a`-`b` with this side's line. The caller
    /// guarantees `a` and `b` lie on opposite sides.
    fn intersect(self, rect: &Rect, a: &Position, b: &Position) -> Position {
        match self {
            Side::Left | Side::Right => {
                let x = if matches!(self, Side::Left) { rect.min.x } else { rect.max.x };
                let t = (x - a.x) / (b.x - a.x);
                Position::new(x, a.y + t * (b.y - a.y))
            }
            Side::Top | Side::Bottom => {
                let y = if matches!(self, Side::Top) { rect.min.y } else { rect.max.y };
                let t = (y - a.y) / (b.y - a.y);
                Position::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// Shoelace area, positive for counterclockwise rings (y up).
pub fn signed_area(polygon: &[Position]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        twice += a.x * b.y - b.x * a.y;
    }
    twice / 2.0
}

/// Drop consecutive (and wrap-around) duplicate vertices.
fn dedup_ring(mut ring: Vec<Position>) -> Vec<Position> {
    ring.dedup_by(|a, b| a.dist_sq(b) <= EPSILON * EPSILON);
    while ring.len() > 1 && ring[0].dist_sq(&ring[ring.len() - 1]) <= EPSILON * EPSILON {
        ring.pop();
    }
    ring
}

fn clip_side(ring: &[Position], rect: &Rect, side: Side) -> Vec<Position> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n + 2);
    for i in 0..n {
        let prev = &ring[(i + n - 1) % n];
        let cur = &ring[i];
        match (side.inside(rect, prev), side.inside(rect, cur)) {
            (true, true) => out.push(*cur),
            (true, false) => out.push(side.intersect(rect, prev, cur)),
            (false, true) => {
                out.push(side.intersect(rect, prev, cur));
                out.push(*cur);
            }
            (false, false) => {}
        }
    }
    out
}

/// Intersect `polygon` with `rect` (Sutherland-Hodgman).
///
/// Returns no polygon when the intersection is empty or degenerates to a
/// line or point. Convex inputs yield their exact intersection. A
/// non-convex input whose intersection is disconnected comes back as one
/// ring joined by coincident edges along the rectangle boundary, which
/// [`is_simple_non_empty`] rejects.
pub fn clip(polygon: &[Position], rect: &Rect) -> Vec<Vec<Position>> {
    if polygon.len() < 3 {
        return Vec::new();
    }

    let mut ring = polygon.to_vec();
    for side in Side::ALL {
        ring = clip_side(&ring, rect, side);
        if ring.is_empty() {
            return Vec::new();
        }
    }

    let ring = dedup_ring(ring);
    if ring.len() < 3 || signed_area(&ring).abs() <= EPSILON {
        return Vec::new();
    }
    vec![ring]
}

fn on_segment(p: &Position, q: &Position, r: &Position) -> bool {
    r.x >= p.x.min(q.x) - EPSILON
        && r.x <= p.x.max(q.x) + EPSILON
        && r.y >= p.y.min(q.y) - EPSILON
        && r.y <= p.y.max(q.y) + EPSILON
}

/// Closed-segment intersection test, touching and collinear overlap included.
fn segments_intersect(a: &Position, b: &Position, c: &Position, d: &Position) -> bool {
    let d1 = c.cross(d, a);
    let d2 = c.cross(d, b);
    let d3 = a.cross(b, c);
    let d4 = a.cross(b, d);

    let straddles = |u: f64, v: f64| (u > EPSILON && v < -EPSILON) || (u < -EPSILON && v > EPSILON);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1.abs() <= EPSILON && on_segment(c, d, a))
        || (d2.abs() <= EPSILON && on_segment(c, d, b))
        || (d3.abs() <= EPSILON && on_segment(a, b, c))
        || (d4.abs() <= EPSILON && on_segment(a, b, d))
}

/// True when `polygon` is a simple ring enclosing non-zero area.
pub fn is_simple_non_empty(polygon: &[Position]) -> bool {
    let ring = dedup_ring(polygon.to_vec());
    let n = ring.len();
    if n < 3 || signed_area(&ring).abs() <= EPSILON {
        return false;
    }

    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];

        // Adjacent edges only meet at `b`; folding back onto `a-b` is a spike.
        let c = &ring[(i + 2) % n];
        if b.cross(a, c).abs() <= EPSILON && b.dot(a, c) > 0.0 {
            return false;
        }

        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let c = &ring[j];
            let d = &ring[(j + 1) % n];
            if segments_intersect(a, b, c, d) {
                return false;
            }
        }
    }
    true
}
