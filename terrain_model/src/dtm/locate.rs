//! Bucket grid over triangle bounding boxes for point location.

use crate::geometry::Point3;

use super::Triangle;

/// Upper bound on buckets per axis.
const MAX_CELLS_PER_AXIS: usize = 1024;

#[derive(Debug, Clone, Default)]
pub(super) struct TriangleLocator {
    min_x: f64,
    min_y: f64,
    cell: f64,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<u32>>,
}

impl TriangleLocator {
    pub(super) fn build(vertices: &[Point3], triangles: &[Triangle]) -> Self {
        if triangles.is_empty() {
            return Self::default();
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for t in triangles {
            for &i in &t.vertices {
                let p = vertices[i];
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
        }
        let (w, h) = (max_x - min_x, max_y - min_y);
        // roughly one triangle per bucket
        let mut cell = ((w * h) / triangles.len() as f64).sqrt();
        cell = cell
            .max(w / MAX_CELLS_PER_AXIS as f64)
            .max(h / MAX_CELLS_PER_AXIS as f64)
            .max(f64::EPSILON);
        let cols = ((w / cell).floor() as usize + 1).min(MAX_CELLS_PER_AXIS);
        let rows = ((h / cell).floor() as usize + 1).min(MAX_CELLS_PER_AXIS);

        let mut locator = Self {
            min_x,
            min_y,
            cell,
            cols,
            rows,
            buckets: vec![Vec::new(); cols * rows],
        };
        for (idx, t) in triangles.iter().enumerate() {
            let xs = t.vertices.map(|i| vertices[i].x);
            let ys = t.vertices.map(|i| vertices[i].y);
            let (c0, r0) = locator.cell_of(xs[0].min(xs[1]).min(xs[2]), ys[0].min(ys[1]).min(ys[2]));
            let (c1, r1) = locator.cell_of(xs[0].max(xs[1]).max(xs[2]), ys[0].max(ys[1]).max(ys[2]));
            for r in r0..=r1 {
                for c in c0..=c1 {
                    locator.buckets[r * cols + c].push(idx as u32);
                }
            }
        }
        log::debug!(
            "triangle locator: {}x{} buckets of size {:.3}",
            cols,
            rows,
            cell
        );
        locator
    }

    fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let c = ((x - self.min_x) / self.cell).floor().max(0.0) as usize;
        let r = ((y - self.min_y) / self.cell).floor().max(0.0) as usize;
        (c.min(self.cols - 1), r.min(self.rows - 1))
    }

    pub(super) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Triangles whose bounding box overlaps the bucket holding `(x, y)`, in
    /// ascending index order.
    pub(super) fn candidates(&self, x: f64, y: f64) -> &[u32] {
        let max_x = self.min_x + self.cell * self.cols as f64;
        let max_y = self.min_y + self.cell * self.rows as f64;
        if self.buckets.is_empty()
            || !(x >= self.min_x && y >= self.min_y && x <= max_x && y <= max_y)
        {
            return &[];
        }
        let (c, r) = self.cell_of(x, y);
        &self.buckets[r * self.cols + c]
    }
}
