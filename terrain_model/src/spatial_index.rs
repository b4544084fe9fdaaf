//! Uniform grid over the XY projection for radius-bounded neighbor search.

use rustc_hash::FxHashMap;

use crate::error::{Result, TerrainError};
use crate::geometry::Point;
use crate::points::SurveyPoint;

/// A point found by a radius query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index into the slice the index was built from.
    pub index: usize,
    pub distance: f64,
}

/// Packs two cell coordinates into one 64-bit hash key.
#[inline]
pub fn cell_key(cx: i32, cy: i32) -> u64 {
    ((cx as u32 as u64) << 32) | (cy as u32 as u64)
}

/// Bucket grid keyed by `(floor(x / cell_size), floor(y / cell_size))`.
///
/// Built once in O(n) and read-only afterwards, so it can be shared across
/// worker threads.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f64,
    positions: Vec<Point>,
    cells: FxHashMap<u64, Vec<usize>>,
}

impl SpatialIndex {
    /// Indexes the XY projection of `points`.
    pub fn new(points: &[SurveyPoint], cell_size: f64) -> Result<Self> {
        Self::from_positions(points.iter().map(|p| p.xy()).collect(), cell_size)
    }

    /// Indexes raw XY positions.
    pub fn from_positions(positions: Vec<Point>, cell_size: f64) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "spatial index cell size must be positive, got {}",
                cell_size
            )));
        }
        let mut cells: FxHashMap<u64, Vec<usize>> = FxHashMap::default();
        for (i, p) in positions.iter().enumerate() {
            let (cx, cy) = Self::cell_of(cell_size, p.x, p.y);
            cells.entry(cell_key(cx, cy)).or_default().push(i);
        }
        log::debug!(
            "spatial index: {} points in {} cells (cell size {})",
            positions.len(),
            cells.len(),
            cell_size
        );
        Ok(Self {
            cell_size,
            positions,
            cells,
        })
    }

    #[inline]
    fn cell_of(cell_size: f64, x: f64, y: f64) -> (i32, i32) {
        // float-to-int casts saturate, so far-away coordinates stay in range
        ((x / cell_size).floor() as i32, (y / cell_size).floor() as i32)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Points within `radius` of `(x, y)`, nearest first, at most
    /// `max_count` of them. Ties in distance are ordered by index.
    pub fn query_radius(&self, x: f64, y: f64, radius: f64, max_count: usize) -> Vec<Neighbor> {
        let mut found = Vec::new();
        self.collect_within(x, y, radius, &mut found);
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found.truncate(max_count);
        found
            .into_iter()
            .map(|(index, d2)| Neighbor {
                index,
                distance: d2.sqrt(),
            })
            .collect()
    }

    /// Pushes `(index, squared distance)` for every point within `radius`.
    fn collect_within(&self, x: f64, y: f64, radius: f64, out: &mut Vec<(usize, f64)>) {
        if !(radius >= 0.0) || self.positions.is_empty() {
            return;
        }
        let r2 = radius * radius;
        let mut push_cell = |members: &Vec<usize>| {
            for &i in members {
                let p = self.positions[i];
                let d2 = (p.x - x).powi(2) + (p.y - y).powi(2);
                if d2 <= r2 {
                    out.push((i, d2));
                }
            }
        };
        let reach = (radius / self.cell_size).ceil().min(i32::MAX as f64) as i64;
        let window = (2 * reach + 1).saturating_mul(2 * reach + 1);
        if window as usize > self.cells.len() {
            // the scan window is larger than the occupied grid
            for members in self.cells.values() {
                push_cell(members);
            }
            return;
        }
        let (cx, cy) = Self::cell_of(self.cell_size, x, y);
        let (cx, cy) = (cx as i64, cy as i64);
        for gx in cx - reach..=cx + reach {
            for gy in cy - reach..=cy + reach {
                let key = cell_key(gx as i32, gy as i32);
                if let Some(members) = self.cells.get(&key) {
                    push_cell(members);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points(n: usize, spacing: f64) -> Vec<SurveyPoint> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let id = format!("{}", pts.len());
                pts.push(SurveyPoint::new(id, i as f64 * spacing, j as f64 * spacing, 0.0));
            }
        }
        pts
    }

    fn brute_force(pts: &[SurveyPoint], x: f64, y: f64, r: f64) -> Vec<usize> {
        let mut v: Vec<(usize, f64)> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p.x - x).hypot(p.y - y)))
            .filter(|(_, d)| *d <= r)
            .collect();
        v.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        v.into_iter().map(|(i, _)| i).collect()
    }

    #[test]
    fn matches_brute_force() {
        let pts = grid_points(20, 1.5);
        let index = SpatialIndex::new(&pts, 2.0).unwrap();
        for &(x, y, r) in &[(5.0, 5.0, 3.0), (0.0, 0.0, 4.5), (14.2, 7.7, 6.0), (-3.0, -3.0, 2.0)] {
            let got: Vec<usize> = index
                .query_radius(x, y, r, usize::MAX)
                .iter()
                .map(|n| n.index)
                .collect();
            assert_eq!(got, brute_force(&pts, x, y, r));
        }
    }

    #[test]
    fn truncates_to_nearest() {
        let pts = grid_points(10, 1.0);
        let index = SpatialIndex::new(&pts, 0.5).unwrap();
        let found = index.query_radius(4.1, 4.1, 3.0, 4);
        assert_eq!(found.len(), 4);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(pts[found[0].index].x, 4.0);
        assert_eq!(pts[found[0].index].y, 4.0);
    }

    #[test]
    fn negative_coordinates_and_keys() {
        assert_ne!(cell_key(-1, 0), cell_key(0, -1));
        assert_ne!(cell_key(1, 2), cell_key(2, 1));
        let pts = vec![
            SurveyPoint::new("a", -0.5, -0.5, 0.0),
            SurveyPoint::new("b", 0.5, 0.5, 0.0),
        ];
        let index = SpatialIndex::new(&pts, 1.0).unwrap();
        assert_eq!(index.occupied_cells(), 2);
        assert_eq!(index.query_radius(-0.4, -0.4, 0.2, 10)[0].index, 0);
    }

    #[test]
    fn rejects_bad_cell_size() {
        assert!(SpatialIndex::new(&[], 0.0).is_err());
        assert!(SpatialIndex::new(&[], f64::NAN).is_err());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = SpatialIndex::new(&[], 1.0).unwrap();
        assert!(index.is_empty());
        assert!(index.query_radius(0.0, 0.0, 10.0, 5).is_empty());
    }
}
