//! Contour extraction with crossings stitched across shared edges.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{edge_key, triangle_edges, Triangulation};
use crate::geometry::{Point3, Polyline3};

/// One contour polyline at a fixed elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourLine {
    pub elevation: f64,
    pub line: Polyline3,
    /// The line returns to its start; the first vertex is repeated at the end.
    pub closed: bool,
}

/// Upper bound on contour levels per call.
const MAX_LEVELS: i64 = 100_000;

impl Triangulation {
    /// Contours every `interval` units of elevation. A non-positive interval
    /// or an empty mesh yields nothing.
    pub fn contours(&self, interval: f64) -> Vec<ContourLine> {
        if !(interval.is_finite() && interval > 0.0) || self.triangles.is_empty() {
            return Vec::new();
        }
        let (min_z, max_z) = self
            .triangles
            .iter()
            .flat_map(|t| t.vertices)
            .map(|i| self.vertices[i].z)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), z| {
                (lo.min(z), hi.max(z))
            });
        let first = (min_z / interval).ceil() as i64;
        let last = ((max_z / interval).floor() as i64).min(first + MAX_LEVELS);
        let mut out = Vec::new();
        for k in first..=last {
            out.extend(self.contours_at(k as f64 * interval));
        }
        log::debug!("{} contour lines at interval {}", out.len(), interval);
        out
    }

    /// Contour lines at one elevation.
    ///
    /// A vertex counts as above the level when `z >= level`, so each triangle
    /// is crossed on zero or two edges. Crossings are keyed by edge and linked
    /// through the triangles that share them; chains that end on the mesh
    /// border are open, the rest are closed loops.
    pub fn contours_at(&self, level: f64) -> Vec<ContourLine> {
        let mut crossings: FxHashMap<(usize, usize), Point3> = FxHashMap::default();
        let mut links: FxHashMap<(usize, usize), Vec<(usize, usize)>> = FxHashMap::default();
        for t in &self.triangles {
            let mut hit = Vec::with_capacity(2);
            for (a, b) in triangle_edges(t.vertices) {
                let key = edge_key(a, b);
                let (pa, pb) = (self.vertices[key.0], self.vertices[key.1]);
                if (pa.z >= level) != (pb.z >= level) {
                    crossings
                        .entry(key)
                        .or_insert_with(|| interpolate(pa, pb, level));
                    hit.push(key);
                }
            }
            if let [e0, e1] = hit[..] {
                links.entry(e0).or_default().push(e1);
                links.entry(e1).or_default().push(e0);
            }
        }

        let mut starts: Vec<(usize, usize)> = links.keys().copied().collect();
        starts.sort_unstable();
        // open chains start at crossings used by a single triangle
        starts.sort_by_key(|k| links[k].len() != 1);

        let mut visited: FxHashMap<(usize, usize), bool> = FxHashMap::default();
        let mut lines = Vec::new();
        for start in starts {
            if visited.contains_key(&start) {
                continue;
            }
            let mut chain = vec![start];
            visited.insert(start, true);
            let mut current = start;
            while let Some(&next) = links[&current].iter().find(|k| !visited.contains_key(*k)) {
                visited.insert(next, true);
                chain.push(next);
                current = next;
            }
            let closed = chain.len() > 2 && links[&current].contains(&start);
            let mut vertices: Vec<Point3> = chain.iter().map(|k| crossings[k]).collect();
            if closed {
                vertices.push(vertices[0]);
            }
            lines.push(ContourLine {
                elevation: level,
                line: Polyline3::new(vertices),
                closed,
            });
        }
        lines
    }
}

/// Point on `a`-`b` where the linear elevation equals `level`.
fn interpolate(a: Point3, b: Point3, level: f64) -> Point3 {
    let t = (level - a.z) / (b.z - a.z);
    Point3::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y), level)
}

#[cfg(test)]
mod tests {
    use crate::dtm::{triangulate, TriangulationConfig};
    use crate::points::SurveyPoint;

    fn surface(n: usize, f: impl Fn(f64, f64) -> f64) -> Vec<SurveyPoint> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f64, j as f64);
                pts.push(SurveyPoint::new(format!("{i}-{j}"), x, y, f(x, y)));
            }
        }
        pts
    }

    #[test]
    fn ramp_contours_are_single_open_lines() {
        let pts = surface(5, |x, _| x + 0.5);
        let tin = triangulate(&pts, &[], &[], &TriangulationConfig::default()).unwrap();
        let lines = tin.contours(1.0);
        assert_eq!(lines.len(), 4);
        for c in &lines {
            assert!(!c.closed);
            assert!(c.line.vertices.iter().all(|p| (p.x + 0.5 - c.elevation).abs() < 1e-9));
            let ys: Vec<f64> = c.line.vertices.iter().map(|p| p.y).collect();
            assert!(ys.contains(&0.0) && ys.contains(&4.0));
            assert!((c.line.length() - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mound_contour_closes() {
        let pts = surface(5, |x, y| if x == 2.0 && y == 2.0 { 10.0 } else { 0.0 });
        let tin = triangulate(&pts, &[], &[], &TriangulationConfig::default()).unwrap();
        let lines = tin.contours_at(5.0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].closed);
        assert!(lines[0].line.is_closed());
    }

    #[test]
    fn bad_interval_is_empty() {
        let pts = surface(3, |x, y| x + y);
        let tin = triangulate(&pts, &[], &[], &TriangulationConfig::default()).unwrap();
        assert!(tin.contours(0.0).is_empty());
        assert!(tin.contours(-2.0).is_empty());
    }
}
