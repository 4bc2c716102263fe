//! Voronoi diagram construction and the clipped tessellation built from it.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use spade::handles::{FixedFaceHandle, InnerTag};
use spade::{DelaunayTriangulation, Point2, Triangulation};

use crate::geometry::{clip, is_simple_non_empty, Rect};
use crate::{random_positions, Position, Result, ShredderError};

/// One corner of a Voronoi cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellVertex {
    /// Index into [`VoronoiDiagram::vertices`]
    Finite(usize),
    /// The cell is open towards infinity between its neighbours
    Unbounded,
}

/// Voronoi diagram of a point set
#[derive(Debug)]
pub struct VoronoiDiagram {
    pub points: Vec<Position>,
    /// Circumcenters of the Delaunay triangles
    pub vertices: Vec<Position>,
    /// Cell corners for each input point, in rotational order
    pub regions: Vec<Vec<CellVertex>>,
}

/// Integer pixel polygon, implicitly closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub points: Vec<(i32, i32)>,
}

impl Polygon {
    pub fn new(points: Vec<(i32, i32)>) -> Self {
        Self { points }
    }

    fn from_ring(ring: &[Position]) -> Self {
        Self::new(
            ring.iter()
                .map(|p| (p.x.round() as i32, p.y.round() as i32))
                .collect(),
        )
    }

    /// Inclusive `(min, max)` corners of the vertex bounding box
    pub fn bounds(&self) -> Option<((i32, i32), (i32, i32))> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), &(x, y)| {
            ((lo.0.min(x), lo.1.min(y)), (hi.0.max(x), hi.1.max(y)))
        }))
    }
}

fn circumcenter(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> Option<Position> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < f64::EPSILON {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    Some(Position::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    ))
}

impl VoronoiDiagram {
    /// Build the diagram as the dual of a Delaunay triangulation.
    ///
    /// Points the triangulation rejects, and repeats of an earlier point,
    /// get an empty region.
    pub fn build(points: &[Position]) -> Self {
        let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
        let handles: Vec<_> = points
            .iter()
            .map(|p| match triangulation.insert(Point2::new(p.x, p.y)) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::warn!("skipping seed point ({}, {}): {:?}", p.x, p.y, e);
                    None
                }
            })
            .collect();

        let mut vertices = Vec::with_capacity(triangulation.num_inner_faces());
        let mut vertex_of_face: HashMap<FixedFaceHandle<InnerTag>, usize> = HashMap::new();
        for face in triangulation.inner_faces() {
            let [a, b, c] = face.vertices().map(|v| v.position());
            if let Some(center) = circumcenter(a, b, c) {
                vertex_of_face.insert(face.fix(), vertices.len());
                vertices.push(center);
            }
        }

        let mut claimed = HashSet::new();
        let regions = handles
            .iter()
            .map(|handle| match handle {
                Some(handle) if claimed.insert(*handle) => triangulation
                    .vertex(*handle)
                    .out_edges()
                    .map(|edge| {
                        edge.face()
                            .as_inner()
                            .and_then(|face| vertex_of_face.get(&face.fix()).copied())
                            .map_or(CellVertex::Unbounded, CellVertex::Finite)
                    })
                    .collect(),
                _ => Vec::new(),
            })
            .collect();

        Self {
            points: points.to_vec(),
            vertices,
            regions,
        }
    }

    /// Finite corners of cell `index`, in their existing order.
    ///
    /// Open cells lose their unbounded corners, which closes them with a
    /// chord between the remaining ones. Cells with more than one open side
    /// come out misshapen; that approximation is kept as is.
    pub fn cell_polygon(&self, index: usize) -> Vec<Position> {
        self.regions[index]
            .iter()
            .filter_map(|v| match v {
                CellVertex::Finite(i) => Some(self.vertices[*i]),
                CellVertex::Unbounded => None,
            })
            .collect()
    }

    /// Clip every cell to `rect`, keeping those that stay a single simple
    /// polygon with area. Output follows input point order.
    pub fn clipped_polygons(&self, rect: &Rect) -> Vec<Polygon> {
        let mut open_cells = 0usize;
        let polygons: Vec<Polygon> = (0..self.regions.len())
            .filter_map(|index| {
                if self.regions[index].contains(&CellVertex::Unbounded) {
                    open_cells += 1;
                }
                let candidate = self.cell_polygon(index);
                if !is_simple_non_empty(&candidate) {
                    return None;
                }
                match clip(&candidate, rect).as_slice() {
                    [ring] if is_simple_non_empty(ring) => Some(Polygon::from_ring(ring)),
                    _ => None,
                }
            })
            .collect();

        log::debug!(
            "tessellation: {} cells ({} open), {} kept, {} discarded",
            self.regions.len(),
            open_cells,
            polygons.len(),
            self.regions.len() - polygons.len(),
        );
        polygons
    }
}

/// Random Voronoi tessellation of a `width` x `height` image, clipped to
/// its bounds. Returns at most `count` polygons.
pub fn generate_polygons<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Polygon>> {
    if count < 1 {
        return Err(ShredderError::InvalidParameter(
            "point count must be at least 1".into(),
        ));
    }
    if width == 0 || height == 0 {
        return Err(ShredderError::InvalidParameter(format!(
            "image must have non-zero size, got {}x{}",
            width, height
        )));
    }

    let (w, h) = (width as f64, height as f64);
    let points = random_positions(count, w, h, rng);
    let diagram = VoronoiDiagram::build(&points);
    Ok(diagram.clipped_polygons(&Rect::from_size(w, h)))
}
