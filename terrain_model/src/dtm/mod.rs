//! Triangulated irregular network (TIN) built from survey points.
//!
//! [`triangulate`] produces a [`Triangulation`]: an immutable batch of
//! triangles and edges over the input points plus any vertices contributed by
//! breaklines. Queries (point location, elevation, slope, aspect, contours,
//! volumes, rasterisation) read the finished mesh.

mod build;
pub mod constraints;
mod contour;
mod locate;
mod volume;

pub use build::triangulate;
pub use constraints::{
    Breakline, BreaklineKind, BreaklineVertex, ConstraintRegion, RegionKind, TriangulationConfig,
};
pub use contour::ContourLine;
pub use volume::CutFill;

use nalgebra::Vector3;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{orient2d, Point, Point3};
use crate::interpolation::{rasterize, ElevationGrid, GridConfig};
use locate::TriangleLocator;

/// Barycentric tolerance for point-in-triangle tests; points on a shared
/// edge resolve to the lower-indexed triangle.
const CONTAINMENT_EPS: f64 = 1e-9;

/// Barycentric weights of `p` with respect to triangle `abc`.
fn barycentric(p: Point, a: Point3, b: Point3, c: Point3) -> Option<(f64, f64, f64)> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < f64::EPSILON {
        return None;
    }
    let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
    let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
    let w = 1.0 - u - v;
    Some((u, v, w))
}

/// A mesh face with its derived attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    /// Vertex indices, counter-clockwise.
    pub vertices: [usize; 3],
    /// Signed planimetric area; positive for the stored winding.
    pub area: f64,
    pub centroid: Point3,
    /// Unit normal pointing upwards.
    pub normal: [f64; 3],
    /// Degrees from horizontal.
    pub slope: f64,
    /// Compass bearing of the downslope direction in degrees, `None` for a
    /// level face.
    pub aspect: Option<f64>,
}

impl Triangle {
    fn new(vertices: [usize; 3], a: Point3, b: Point3, c: Point3) -> Self {
        let area = orient2d(a.xy(), b.xy(), c.xy()) * 0.5;
        let centroid = Point3::new(
            (a.x + b.x + c.x) / 3.0,
            (a.y + b.y + c.y) / 3.0,
            (a.z + b.z + c.z) / 3.0,
        );
        let ab = Vector3::new(b.x - a.x, b.y - a.y, b.z - a.z);
        let ac = Vector3::new(c.x - a.x, c.y - a.y, c.z - a.z);
        let mut n = ab.cross(&ac);
        if n.z < 0.0 {
            n = -n;
        }
        let n = n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z);
        let slope = n.z.clamp(-1.0, 1.0).acos().to_degrees();
        let aspect = if n.x.hypot(n.y) <= 1e-12 {
            None
        } else {
            Some(n.x.atan2(n.y).to_degrees().rem_euclid(360.0))
        };
        Self {
            vertices,
            area,
            centroid,
            normal: [n.x, n.y, n.z],
            slope,
            aspect,
        }
    }
}

/// A mesh edge, stored once with `vertices[0] < vertices[1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub vertices: [usize; 2],
    /// Planimetric length.
    pub length: f64,
    /// Bounds exactly one triangle.
    pub hull: bool,
    /// Part of an embedded breakline.
    pub breakline: bool,
}

/// Result of one triangulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triangulation {
    vertices: Vec<Point3>,
    triangles: Vec<Triangle>,
    edges: Vec<Edge>,
    constrained: bool,
    warnings: Vec<String>,
    #[serde(skip)]
    locator: TriangleLocator,
}

impl Triangulation {
    /// Assembles a mesh from raw vertex triples. Triples are rewound to
    /// counter-clockwise order and zero-area triples are dropped.
    pub(crate) fn from_parts(
        vertices: Vec<Point3>,
        raw: Vec<[usize; 3]>,
        constraint_edges: &FxHashSet<(usize, usize)>,
        constrained: bool,
        warnings: Vec<String>,
    ) -> Self {
        let triangles: Vec<Triangle> = raw
            .into_iter()
            .filter_map(|[i, j, k]| {
                let (a, b, c) = (vertices[i], vertices[j], vertices[k]);
                let o = orient2d(a.xy(), b.xy(), c.xy());
                if o == 0.0 {
                    None
                } else if o > 0.0 {
                    Some(Triangle::new([i, j, k], a, b, c))
                } else {
                    Some(Triangle::new([i, k, j], a, c, b))
                }
            })
            .collect();

        let mut counts: FxHashMap<(usize, usize), u32> = FxHashMap::default();
        for t in &triangles {
            for (a, b) in triangle_edges(t.vertices) {
                *counts.entry(edge_key(a, b)).or_default() += 1;
            }
        }
        let mut edges: Vec<Edge> = counts
            .into_iter()
            .map(|((a, b), count)| Edge {
                vertices: [a, b],
                length: (vertices[b].x - vertices[a].x).hypot(vertices[b].y - vertices[a].y),
                hull: count == 1,
                breakline: constraint_edges.contains(&(a, b)),
            })
            .collect();
        edges.sort_by_key(|e| e.vertices);

        let locator = TriangleLocator::build(&vertices, &triangles);
        log::info!(
            "triangulation: {} vertices, {} triangles, {} edges ({} hull)",
            vertices.len(),
            triangles.len(),
            edges.len(),
            edges.iter().filter(|e| e.hull).count()
        );
        Self {
            vertices,
            triangles,
            edges,
            constrained,
            warnings,
            locator,
        }
    }

    /// Input points first, in input order, followed by breakline vertices.
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn hull_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.hull)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether breakline segments were embedded.
    pub fn is_constrained(&self) -> bool {
        self.constrained
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    fn corners(&self, t: &Triangle) -> (Point3, Point3, Point3) {
        (
            self.vertices[t.vertices[0]],
            self.vertices[t.vertices[1]],
            self.vertices[t.vertices[2]],
        )
    }

    fn contains(&self, t: &Triangle, p: Point) -> Option<(f64, f64, f64)> {
        let (a, b, c) = self.corners(t);
        barycentric(p, a, b, c).filter(|&(u, v, w)| {
            u >= -CONTAINMENT_EPS && v >= -CONTAINMENT_EPS && w >= -CONTAINMENT_EPS
        })
    }

    fn locate(&self, x: f64, y: f64) -> Option<(&Triangle, (f64, f64, f64))> {
        let p = Point::new(x, y);
        if self.locator.is_empty() {
            // deserialised meshes carry no locator
            return self
                .triangles
                .iter()
                .find_map(|t| self.contains(t, p).map(|w| (t, w)));
        }
        self.locator
            .candidates(x, y)
            .iter()
            .find_map(|&i| {
                let t = &self.triangles[i as usize];
                self.contains(t, p).map(|w| (t, w))
            })
    }

    /// Triangle containing `(x, y)`, or `None` outside the mesh.
    pub fn find_triangle_at(&self, x: f64, y: f64) -> Option<&Triangle> {
        self.locate(x, y).map(|(t, _)| t)
    }

    /// Barycentric elevation at `(x, y)`.
    pub fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        let (t, (u, v, w)) = self.locate(x, y)?;
        let (a, b, c) = self.corners(t);
        Some(u * a.z + v * b.z + w * c.z)
    }

    pub fn slope_at(&self, x: f64, y: f64) -> Option<f64> {
        self.find_triangle_at(x, y).map(|t| t.slope)
    }

    /// Aspect of the owning triangle; `None` outside the mesh or on a level
    /// face.
    pub fn aspect_at(&self, x: f64, y: f64) -> Option<f64> {
        self.find_triangle_at(x, y).and_then(|t| t.aspect)
    }

    /// Rasterises the mesh onto `config` by barycentric sampling. Cells
    /// outside the mesh take the no-data value.
    pub fn to_grid(&self, config: &GridConfig, cancel: Option<&CancelToken>) -> Result<ElevationGrid> {
        rasterize(config, cancel, |x, y| self.elevation_at(x, y))
    }
}

pub(crate) fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

pub(crate) fn triangle_edges(v: [usize; 3]) -> [(usize, usize); 3] {
    [(v[0], v[1]), (v[1], v[2]), (v[2], v[0])]
}
