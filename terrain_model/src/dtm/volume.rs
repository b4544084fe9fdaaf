use serde::{Deserialize, Serialize};

use super::Triangulation;

/// Earthwork quantities against a horizontal plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CutFill {
    /// Volume of terrain above the plane.
    pub cut: f64,
    /// Volume of void below the plane.
    pub fill: f64,
}

impl CutFill {
    pub fn net(&self) -> f64 {
        self.cut - self.fill
    }
}

/// Volume of the part of a linear prism above height zero, for heights
/// `h` at the corners of a triangle with planimetric area `area`.
fn positive_volume(area: f64, h: [f64; 3]) -> f64 {
    let mut h = h;
    h.sort_by(|a, b| b.total_cmp(a));
    let [h0, h1, h2] = h;
    if h2 >= 0.0 {
        area * (h0 + h1 + h2) / 3.0
    } else if h0 <= 0.0 {
        0.0
    } else if h1 <= 0.0 {
        // only the highest corner is above
        area * h0.powi(3) / (3.0 * (h0 - h1) * (h0 - h2))
    } else {
        // only the lowest corner is below
        area * (h0 + h1 + h2) / 3.0 + area * (-h2).powi(3) / (3.0 * (h0 - h2) * (h1 - h2))
    }
}

impl Triangulation {
    /// Net volume between the surface and the plane at `base`; negative
    /// where the surface lies below it.
    pub fn volume_to_elevation(&self, base: f64) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let avg = t.vertices.iter().map(|&i| self.vertices[i].z).sum::<f64>() / 3.0;
                t.area.abs() * (avg - base)
            })
            .sum()
    }

    /// Cut and fill against the plane at `base`, splitting triangles that
    /// straddle it.
    pub fn cut_fill_to_elevation(&self, base: f64) -> CutFill {
        self.triangles
            .iter()
            .fold(CutFill::default(), |acc, t| {
                let h = t.vertices.map(|i| self.vertices[i].z - base);
                let area = t.area.abs();
                CutFill {
                    cut: acc.cut + positive_volume(area, h),
                    fill: acc.fill + positive_volume(area, h.map(|v| -v)),
                }
            })
    }
}
