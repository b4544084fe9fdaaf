//! 3D polylines and iterative Douglas–Peucker simplification.

use super::{distance, distance3, Point, Point3};

/// Connected 3D line segments, used for contours and breakline geometry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Polyline3 {
    pub vertices: Vec<Point3>,
}

impl Polyline3 {
    pub fn new(vertices: Vec<Point3>) -> Self {
        Self { vertices }
    }

    /// Total 3D length of all segments.
    pub fn length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|pair| distance3(pair[0], pair[1]))
            .sum()
    }

    /// Returns `true` when the first and last vertices coincide.
    pub fn is_closed(&self) -> bool {
        match (self.vertices.first(), self.vertices.last()) {
            (Some(a), Some(b)) if self.vertices.len() > 2 => a == b,
            _ => false,
        }
    }

    /// Returns a simplified copy keeping only vertices farther than
    /// `tolerance` (horizontally) from the simplified line.
    pub fn simplify(&self, tolerance: f64) -> Self {
        let xy: Vec<Point> = self.vertices.iter().map(|p| p.xy()).collect();
        let vertices = simplify_indices(&xy, tolerance)
            .into_iter()
            .map(|i| self.vertices[i])
            .collect();
        Self { vertices }
    }
}

/// Distance from `p` to the segment `a`-`b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return distance(p, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    distance(p, Point::new(a.x + t * dx, a.y + t * dy))
}

/// Douglas–Peucker over a single backing slice.
///
/// Works on an explicit stack of `(start, end)` index ranges, so long
/// breaklines neither reallocate sub-slices nor recurse. Returns the indices
/// of the kept vertices in ascending order; the endpoints are always kept.
pub fn simplify_indices(points: &[Point], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 || tolerance <= 0.0 {
        return (0..n).collect();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut split = start;
        for i in start + 1..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                split = i;
            }
        }
        if max_dist > tolerance {
            keep[split] = true;
            stack.push((split, end));
            stack.push((start, split));
        }
    }
    keep.iter()
        .enumerate()
        .filter(|(_, k)| **k)
        .map(|(i, _)| i)
        .collect()
}
