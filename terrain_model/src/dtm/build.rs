//! Mesh construction: plain Delaunay through `delaunator`, breakline
//! constrained Delaunay through `spade`.

use rustc_hash::FxHashSet;
use spade::handles::FixedVertexHandle;
use spade::{ConstrainedDelaunayTriangulation, Point2, PositionInTriangulation, Triangulation as _};

use super::constraints::{Breakline, BreaklineKind, ConstraintRegion, RegionKind, TriangulationConfig};
use super::{barycentric, edge_key, Triangulation};
use crate::error::Result;
use crate::geometry::{point_in_polygon, Point, Point3};
use crate::points::SurveyPoint;
use crate::spatial_index::SpatialIndex;

/// Smallest bucket used when looking for coincident points.
const SNAP_CELL_MIN: f64 = 1.0;

type Cdt = ConstrainedDelaunayTriangulation<Point2<f64>>;

/// Builds a TIN over `points`.
///
/// With breaklines and `enforce_breaklines`, every accepted breakline
/// segment is an edge of the result. Segments that would cross an earlier
/// segment or leave the hull of the points are not embedded; a warning names
/// each one. Fewer than three distinct, non-collinear points give an empty
/// mesh.
pub fn triangulate(
    points: &[SurveyPoint],
    breaklines: &[Breakline],
    regions: &[ConstraintRegion],
    config: &TriangulationConfig,
) -> Result<Triangulation> {
    config.validate()?;
    let mut warnings = Vec::new();
    let mut vertices: Vec<Point3> = points.iter().map(|p| p.position()).collect();
    let usable = usable_points(&vertices, config.snap_tolerance, &mut warnings);

    let lines: Vec<Breakline> = breaklines
        .iter()
        .filter(|b| {
            if b.vertices.len() < 2 {
                warnings.push(format!("breakline {} has fewer than two vertices; ignored", b.id));
                false
            } else {
                true
            }
        })
        .map(|b| match config.simplify_tolerance {
            Some(tol) if tol > 0.0 => b.simplified(tol),
            _ => b.clone(),
        })
        .collect();

    let constrained = config.enforce_breaklines && !lines.is_empty();
    let (raw, constraint_edges) = if usable.len() < 3 {
        (Vec::new(), FxHashSet::default())
    } else if constrained {
        constrained_delaunay(&mut vertices, &usable, &lines, config, &mut warnings)
    } else {
        (delaunay(&vertices, &usable), FxHashSet::default())
    };

    for region in regions {
        if let RegionKind::Flat(z) = region.kind {
            for v in vertices.iter_mut() {
                if point_in_polygon(v.xy(), &region.polygon) {
                    v.z = z;
                }
            }
        }
    }

    let exclusions: Vec<&[Point]> = regions
        .iter()
        .filter(|r| r.kind == RegionKind::Exclusion)
        .map(|r| r.polygon.as_slice())
        .collect();
    let mut boundaries: Vec<Vec<Point>> = regions
        .iter()
        .filter(|r| r.kind == RegionKind::Boundary)
        .map(|r| r.polygon.clone())
        .collect();
    boundaries.extend(
        lines
            .iter()
            .filter(|b| b.kind == BreaklineKind::Boundary && b.vertices.len() >= 3)
            .map(|b| b.polygon()),
    );

    let before = raw.len();
    let raw: Vec<[usize; 3]> = raw
        .into_iter()
        .filter(|t| {
            let c = centroid_xy(&vertices, *t);
            !exclusions.iter().any(|poly| point_in_polygon(c, poly))
                && (boundaries.is_empty() || boundaries.iter().any(|poly| point_in_polygon(c, poly)))
        })
        .collect();
    if raw.len() < before {
        log::debug!("{} triangles clipped by regions", before - raw.len());
    }
    for w in &warnings {
        log::warn!("{}", w);
    }
    Ok(Triangulation::from_parts(
        vertices,
        raw,
        &constraint_edges,
        constrained,
        warnings,
    ))
}

fn centroid_xy(vertices: &[Point3], t: [usize; 3]) -> Point {
    let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
    Point::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
}

/// Indices of finite points that do not coincide with an earlier point.
fn usable_points(vertices: &[Point3], snap: f64, warnings: &mut Vec<String>) -> Vec<usize> {
    let finite: Vec<usize> = (0..vertices.len())
        .filter(|&i| {
            let v = vertices[i];
            v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
        })
        .collect();
    if finite.len() < vertices.len() {
        warnings.push(format!(
            "{} points with non-finite coordinates skipped",
            vertices.len() - finite.len()
        ));
    }
    if snap <= 0.0 {
        return finite;
    }
    let positions = finite.iter().map(|&i| vertices[i].xy()).collect();
    let Ok(index) = SpatialIndex::from_positions(positions, snap.max(SNAP_CELL_MIN)) else {
        return finite;
    };
    let mut accepted = vec![false; finite.len()];
    let mut usable = Vec::with_capacity(finite.len());
    for (k, &i) in finite.iter().enumerate() {
        let v = vertices[i];
        let taken = index
            .query_radius(v.x, v.y, snap, usize::MAX)
            .iter()
            .any(|n| n.index < k && accepted[n.index]);
        if !taken {
            accepted[k] = true;
            usable.push(i);
        }
    }
    let merged = finite.len() - usable.len();
    if merged > 0 {
        log::debug!("{} coincident points merged into earlier vertices", merged);
    }
    usable
}

fn delaunay(vertices: &[Point3], usable: &[usize]) -> Vec<[usize; 3]> {
    let coords: Vec<delaunator::Point> = usable
        .iter()
        .map(|&i| delaunator::Point {
            x: vertices[i].x,
            y: vertices[i].y,
        })
        .collect();
    let triangulation = delaunator::triangulate(&coords);
    triangulation
        .triangles
        .chunks(3)
        .map(|c| [usable[c[0]], usable[c[1]], usable[c[2]]])
        .collect()
}

/// Incremental constrained Delaunay over points and breaklines.
struct ConstrainedBuilder<'a> {
    cdt: Cdt,
    /// Vertex index for every spade handle, by handle index.
    owner: Vec<usize>,
    vertices: &'a mut Vec<Point3>,
    snap: f64,
}

impl ConstrainedBuilder<'_> {
    fn insert(&mut self, p: Point2<f64>, vertex: usize) -> Option<FixedVertexHandle> {
        let handle = self.cdt.insert(p).ok()?;
        if handle.index() == self.owner.len() {
            self.owner.push(vertex);
        }
        Some(handle)
    }

    fn z_of(&self, handle: FixedVertexHandle) -> f64 {
        self.vertices[self.owner[handle.index()]].z
    }

    /// Existing vertex within the snap tolerance among `candidates`.
    fn snap_to(&self, p: Point2<f64>, candidates: &[FixedVertexHandle]) -> Option<FixedVertexHandle> {
        candidates
            .iter()
            .map(|&h| {
                let q = self.cdt.vertex(h).position();
                (h, (q.x - p.x).hypot(q.y - p.y))
            })
            .filter(|&(_, d)| d <= self.snap)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    /// Places one breakline vertex, reusing a nearby vertex when possible.
    /// Returns `None` outside the hull.
    fn place(&mut self, x: f64, y: f64, pinned: Option<f64>) -> Option<FixedVertexHandle> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let p = Point2::new(x, y);
        let (candidates, derived_z) = match self.cdt.locate(p) {
            PositionInTriangulation::OnVertex(h) => (vec![h], self.z_of(h)),
            PositionInTriangulation::OnEdge(e) => {
                let edge = self.cdt.directed_edge(e);
                let (from, to) = (edge.from(), edge.to());
                let (a, b) = (from.position(), to.position());
                let len2 = (b.x - a.x).powi(2) + (b.y - a.y).powi(2);
                let t = if len2 > 0.0 {
                    (((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (za, zb) = (self.z_of(from.fix()), self.z_of(to.fix()));
                (vec![from.fix(), to.fix()], za + t * (zb - za))
            }
            PositionInTriangulation::OnFace(f) => {
                let handles = self.cdt.face(f).vertices().map(|v| v.fix());
                let corners = handles.map(|h| {
                    let q = self.cdt.vertex(h).position();
                    Point3::new(q.x, q.y, self.z_of(h))
                });
                let z = barycentric(Point::new(x, y), corners[0], corners[1], corners[2])
                    .map(|(u, v, w)| u * corners[0].z + v * corners[1].z + w * corners[2].z)
                    .unwrap_or((corners[0].z + corners[1].z + corners[2].z) / 3.0);
                (handles.to_vec(), z)
            }
            PositionInTriangulation::OutsideOfConvexHull(_)
            | PositionInTriangulation::NoTriangulation => return None,
        };

        if let Some(h) = self.snap_to(p, &candidates) {
            if let Some(z) = pinned {
                let owner = self.owner[h.index()];
                self.vertices[owner].z = z;
            }
            return Some(h);
        }
        let index = self.vertices.len();
        self.vertices.push(Point3::new(x, y, pinned.unwrap_or(derived_z)));
        let handle = self.insert(p, index);
        if handle.is_none() {
            self.vertices.pop();
        }
        handle
    }

    /// Sets z on every vertex the constraint `a -> b` passes through, by
    /// linear interpolation between the endpoint elevations. Returns the
    /// number of vertices pinned.
    fn pin_along(&mut self, a: FixedVertexHandle, b: FixedVertexHandle) -> usize {
        let (pa, pb) = (self.cdt.vertex(a).position(), self.cdt.vertex(b).position());
        let (dx, dy) = (pb.x - pa.x, pb.y - pa.y);
        let len2 = dx * dx + dy * dy;
        if len2 <= 0.0 {
            return 0;
        }
        let len = len2.sqrt();
        let tolerance = self.snap.max(1e-9 * len);
        let (za, zb) = (self.z_of(a), self.z_of(b));

        let mut current = a;
        let mut t_current = 0.0;
        let mut pinned = 0;
        // Each step moves strictly forward along the segment.
        for _ in 0..self.owner.len() {
            if current == b {
                break;
            }
            let next = self
                .cdt
                .vertex(current)
                .out_edges()
                .filter(|e| self.cdt.is_constraint_edge(e.as_undirected().fix()))
                .filter_map(|e| {
                    let q = e.to().position();
                    let (qx, qy) = (q.x - pa.x, q.y - pa.y);
                    let t = (qx * dx + qy * dy) / len2;
                    let off_line = (qx * dy - qy * dx).abs() / len;
                    (t > t_current && t <= 1.0 + 1e-12 && off_line <= tolerance)
                        .then_some((e.to().fix(), t))
                })
                .min_by(|l, r| l.1.total_cmp(&r.1));
            let Some((handle, t)) = next else {
                break;
            };
            if handle != b {
                let owner = self.owner[handle.index()];
                self.vertices[owner].z = za + t * (zb - za);
                pinned += 1;
            }
            current = handle;
            t_current = t;
        }
        pinned
    }
}

fn constrained_delaunay(
    vertices: &mut Vec<Point3>,
    usable: &[usize],
    lines: &[Breakline],
    config: &TriangulationConfig,
    warnings: &mut Vec<String>,
) -> (Vec<[usize; 3]>, FxHashSet<(usize, usize)>) {
    let mut builder = ConstrainedBuilder {
        cdt: Cdt::new(),
        owner: Vec::with_capacity(usable.len()),
        vertices,
        snap: config.snap_tolerance,
    };
    for &i in usable {
        let v = builder.vertices[i];
        if builder.insert(Point2::new(v.x, v.y), i).is_none() {
            warnings.push(format!("point {} could not be inserted", i));
        }
    }

    let mut embedded = 0usize;
    let mut pinned = 0usize;
    for line in lines {
        let hard = line.kind == BreaklineKind::Hard;
        if hard && line.vertices.iter().any(|v| v.z.is_none()) {
            warnings.push(format!(
                "hard breakline {} has vertices without z; surface elevation used there",
                line.id
            ));
        }
        let handles: Vec<Option<FixedVertexHandle>> = line
            .vertices
            .iter()
            .map(|v| builder.place(v.x, v.y, if hard { v.z } else { None }))
            .collect();
        for (seg, pair) in handles.windows(2).enumerate() {
            match (pair[0], pair[1]) {
                (Some(a), Some(b)) if a == b => {}
                (Some(a), Some(b)) => {
                    if builder.cdt.can_add_constraint(a, b) {
                        builder.cdt.add_constraint(a, b);
                        embedded += 1;
                        if hard {
                            pinned += builder.pin_along(a, b);
                        }
                    } else {
                        warnings.push(format!(
                            "breakline {} segment {} crosses another breakline; treated as soft",
                            line.id, seg
                        ));
                    }
                }
                _ => warnings.push(format!(
                    "breakline {} segment {} leaves the point hull; treated as soft",
                    line.id, seg
                )),
            }
        }
    }
    log::debug!(
        "{} breakline segments embedded, {} vertices pinned along hard lines",
        embedded,
        pinned
    );

    let owner = &builder.owner;
    let triangles = builder
        .cdt
        .inner_faces()
        .map(|f| f.vertices().map(|v| owner[v.fix().index()]))
        .collect();
    let constraint_edges = builder
        .cdt
        .undirected_edges()
        .filter(|e| builder.cdt.is_constraint_edge(e.fix()))
        .map(|e| {
            let [a, b] = e.vertices();
            edge_key(owner[a.fix().index()], owner[b.fix().index()])
        })
        .collect();
    (triangles, constraint_edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtm::{triangle_edges, BreaklineVertex};
    use rustc_hash::FxHashMap;

    fn grid(n: usize, spacing: f64) -> Vec<SurveyPoint> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f64 * spacing, j as f64 * spacing);
                pts.push(SurveyPoint::new(format!("{i}-{j}"), x, y, 10.0));
            }
        }
        pts
    }

    fn line(id: &str, kind: BreaklineKind, pts: &[(f64, f64, Option<f64>)]) -> Breakline {
        Breakline::new(
            id,
            kind,
            pts.iter()
                .map(|&(x, y, z)| BreaklineVertex::new(x, y, z))
                .collect(),
        )
    }

    fn has_edge(t: &Triangulation, a: (f64, f64), b: (f64, f64)) -> bool {
        let find = |p: (f64, f64)| {
            t.vertices()
                .iter()
                .position(|v| (v.x - p.0).abs() < 1e-9 && (v.y - p.1).abs() < 1e-9)
        };
        let (Some(i), Some(j)) = (find(a), find(b)) else {
            return false;
        };
        t.edges().iter().any(|e| e.vertices == [i.min(j), i.max(j)] && e.breakline)
    }

    #[test]
    fn hard_breakline_is_embedded_and_pinned() {
        let pts = grid(5, 10.0);
        let bl = line("ridge", BreaklineKind::Hard, &[(5.0, 5.0, Some(20.0)), (35.0, 25.0, Some(20.0))]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        assert!(t.is_constrained());
        assert!(t.warnings().is_empty());
        assert_eq!(t.vertices().len(), pts.len() + 2);
        assert_eq!(t.vertices()[pts.len()].z, 20.0);
        assert!(has_edge(&t, (5.0, 5.0), (35.0, 25.0)));
        let z = t.elevation_at(20.0, 15.0).unwrap();
        assert!((z - 20.0).abs() < 1e-9);
    }

    #[test]
    fn hard_breakline_through_survey_points_pins_them() {
        let pts = grid(5, 10.0);
        let bl = line("crest", BreaklineKind::Hard, &[(0.0, 0.0, Some(50.0)), (40.0, 40.0, Some(50.0))]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        assert!(t.warnings().is_empty());
        assert_eq!(t.vertices().len(), pts.len());
        for (x, y) in [(5.0, 5.0), (15.0, 15.0), (20.0, 20.0), (35.0, 35.0)] {
            let z = t.elevation_at(x, y).unwrap();
            assert!((z - 50.0).abs() < 1e-9, "z at ({x}, {y}) = {z}");
        }
        assert!(has_edge(&t, (10.0, 10.0), (20.0, 20.0)));
        let corner = t.elevation_at(40.0, 0.0).unwrap();
        assert!((corner - 10.0).abs() < 1e-9);
    }

    #[test]
    fn hard_breakline_interpolates_between_end_elevations() {
        let pts = grid(5, 10.0);
        let bl = line("ramp", BreaklineKind::Hard, &[(0.0, 20.0, Some(0.0)), (40.0, 20.0, Some(40.0))]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        for x in [10.0, 20.0, 30.0] {
            let z = t.elevation_at(x, 20.0).unwrap();
            assert!((z - x).abs() < 1e-9);
        }
    }

    #[test]
    fn clipped_constrained_mesh_keeps_edge_counts() {
        let pts = grid(6, 10.0);
        let bl = line("ridge", BreaklineKind::Soft, &[(5.0, 5.0, None), (45.0, 35.0, None)]);
        let hole = ConstraintRegion::new(
            vec![
                Point::new(20.0, 30.0),
                Point::new(40.0, 30.0),
                Point::new(40.0, 50.0),
                Point::new(20.0, 50.0),
            ],
            RegionKind::Exclusion,
        );
        let outer = ConstraintRegion::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(50.0, 0.0),
                Point::new(50.0, 40.0),
                Point::new(0.0, 40.0),
            ],
            RegionKind::Boundary,
        );
        let t = triangulate(&pts, &[bl], &[hole, outer], &TriangulationConfig::default()).unwrap();
        assert!(t.is_constrained());
        assert!(!t.is_empty());

        let mut uses: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        for tri in t.triangles() {
            for (a, b) in triangle_edges(tri.vertices) {
                *uses.entry(edge_key(a, b)).or_default() += 1;
            }
        }
        assert_eq!(uses.len(), t.edges().len());
        for e in t.edges() {
            let n = uses[&(e.vertices[0], e.vertices[1])];
            assert!(n == 1 || n == 2);
            assert_eq!(e.hull, n == 1);
        }
        assert!(t.edges().iter().any(|e| e.breakline));
        assert!(t.elevation_at(30.0, 45.0).is_none());
    }

    #[test]
    fn soft_breakline_takes_surface_elevation() {
        let pts = grid(4, 10.0);
        let bl = line("swale", BreaklineKind::Soft, &[(3.0, 17.0, Some(99.0)), (27.0, 4.0, None)]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        assert!(has_edge(&t, (3.0, 17.0), (27.0, 4.0)));
        assert!(t.vertices().iter().all(|v| v.z == 10.0));
    }

    #[test]
    fn crossing_segment_is_relaxed() {
        let pts = grid(5, 10.0);
        let a = line("a", BreaklineKind::Soft, &[(5.0, 5.0, None), (35.0, 25.0, None)]);
        let b = line("b", BreaklineKind::Soft, &[(5.0, 25.0, None), (35.0, 5.0, None)]);
        let t = triangulate(&pts, &[a, b], &[], &TriangulationConfig::default()).unwrap();
        assert_eq!(t.warnings().len(), 1);
        assert!(t.warnings()[0].contains("breakline b segment 0"));
        assert!(has_edge(&t, (5.0, 5.0), (35.0, 25.0)));
        assert!(!t.is_empty());
    }

    #[test]
    fn segment_outside_hull_is_relaxed() {
        let pts = grid(3, 10.0);
        let bl = line("road", BreaklineKind::Hard, &[(5.0, 5.0, Some(1.0)), (15.0, 5.0, Some(1.0)), (50.0, 5.0, Some(1.0))]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        assert_eq!(t.warnings().len(), 1);
        assert!(t.warnings()[0].contains("segment 1 leaves the point hull"));
        assert!(has_edge(&t, (5.0, 5.0), (15.0, 5.0)));
    }

    #[test]
    fn breakline_vertex_snaps_to_point() {
        let pts = grid(3, 10.0);
        let bl = line("l", BreaklineKind::Hard, &[(10.0004, 10.0, Some(3.0)), (20.0, 20.0, Some(3.0))]);
        let t = triangulate(&pts, &[bl], &[], &TriangulationConfig::default()).unwrap();
        assert_eq!(t.vertices().len(), pts.len());
        assert_eq!(t.vertices()[4].z, 3.0);
    }

    #[test]
    fn exclusion_and_boundary_regions_clip() {
        let pts = grid(5, 10.0);
        let hole = ConstraintRegion::new(
            vec![
                Point::new(10.0, 10.0),
                Point::new(30.0, 10.0),
                Point::new(30.0, 30.0),
                Point::new(10.0, 30.0),
            ],
            RegionKind::Exclusion,
        );
        let t = triangulate(&pts, &[], &[hole], &TriangulationConfig::default()).unwrap();
        let area: f64 = t.triangles().iter().map(|tri| tri.area).sum();
        assert!((area - 1200.0).abs() < 1e-6);
        assert!(t.elevation_at(20.0, 20.0).is_none());

        let outer = ConstraintRegion::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(20.0, 0.0),
                Point::new(20.0, 20.0),
                Point::new(0.0, 20.0),
            ],
            RegionKind::Boundary,
        );
        let t = triangulate(&pts, &[], &[outer], &TriangulationConfig::default()).unwrap();
        let area: f64 = t.triangles().iter().map(|tri| tri.area).sum();
        assert!((area - 400.0).abs() < 1e-6);
    }

    #[test]
    fn flat_region_overrides_elevation() {
        let pts = grid(5, 10.0);
        let pad = ConstraintRegion::new(
            vec![
                Point::new(5.0, 5.0),
                Point::new(35.0, 5.0),
                Point::new(35.0, 35.0),
                Point::new(5.0, 35.0),
            ],
            RegionKind::Flat(42.0),
        );
        let t = triangulate(&pts, &[], &[pad], &TriangulationConfig::default()).unwrap();
        assert_eq!(t.elevation_at(20.0, 20.0), Some(42.0));
        assert_eq!(t.elevation_at(0.0, 0.0), Some(10.0));
    }

    #[test]
    fn enforcement_off_uses_plain_delaunay() {
        let pts = grid(4, 10.0);
        let bl = line("a", BreaklineKind::Hard, &[(5.0, 5.0, Some(50.0)), (25.0, 25.0, Some(50.0))]);
        let config = TriangulationConfig::default().with_enforce_breaklines(false);
        let t = triangulate(&pts, &[bl], &[], &config).unwrap();
        assert!(!t.is_constrained());
        assert_eq!(t.vertices().len(), pts.len());
        assert!(t.edges().iter().all(|e| !e.breakline));
    }

    #[test]
    fn coincident_points_share_a_vertex() {
        let mut pts = grid(3, 10.0);
        pts.push(SurveyPoint::new("dup", 10.0002, 10.0, 99.0));
        let t = triangulate(&pts, &[], &[], &TriangulationConfig::default()).unwrap();
        assert!(t
            .triangles()
            .iter()
            .all(|tri| !tri.vertices.contains(&(pts.len() - 1))));
        assert_eq!(t.triangles().len(), 8);
    }
}
