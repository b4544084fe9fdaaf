//! Breaklines, constraint regions and triangulation settings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::geometry::polyline::simplify_indices;
use crate::geometry::Point;

/// How a breakline shapes the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreaklineKind {
    /// Forced edges whose z values override the surrounding surface.
    Hard,
    /// Forced edges; elevation comes from the surface.
    Soft,
    /// Outer limit of the triangulation.
    Boundary,
}

impl BreaklineKind {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "hard" => Some(Self::Hard),
            "soft" => Some(Self::Soft),
            "boundary" => Some(Self::Boundary),
            _ => None,
        }
    }
}

/// Breakline vertex; `z` is optional because digitised lines often carry
/// planimetry only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreaklineVertex {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl BreaklineVertex {
    pub fn new(x: f64, y: f64, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Ordered polyline constraint supplied by a breakline source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakline {
    pub id: String,
    pub kind: BreaklineKind,
    pub vertices: Vec<BreaklineVertex>,
}

impl Breakline {
    pub fn new(id: impl Into<String>, kind: BreaklineKind, vertices: Vec<BreaklineVertex>) -> Self {
        Self {
            id: id.into(),
            kind,
            vertices,
        }
    }

    /// Copy with Douglas–Peucker applied to the planimetry.
    pub fn simplified(&self, tolerance: f64) -> Self {
        let xy: Vec<Point> = self.vertices.iter().map(|v| v.xy()).collect();
        let vertices = simplify_indices(&xy, tolerance)
            .into_iter()
            .map(|i| self.vertices[i])
            .collect();
        Self {
            id: self.id.clone(),
            kind: self.kind,
            vertices,
        }
    }

    pub fn polygon(&self) -> Vec<Point> {
        self.vertices.iter().map(|v| v.xy()).collect()
    }
}

/// Behaviour of a closed constraint polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "elevation")]
pub enum RegionKind {
    /// Vertices inside take this elevation.
    Flat(f64),
    /// No triangles inside.
    Exclusion,
    /// No triangles outside.
    Boundary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRegion {
    pub polygon: Vec<Point>,
    pub kind: RegionKind,
}

impl ConstraintRegion {
    pub fn new(polygon: Vec<Point>, kind: RegionKind) -> Self {
        Self { polygon, kind }
    }
}

/// Settings for [`triangulate`](super::triangulate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangulationConfig {
    /// Embed breakline segments as mesh edges. When off, only boundary
    /// breaklines are used, for clipping.
    pub enforce_breaklines: bool,
    /// Douglas–Peucker tolerance applied to breaklines before insertion.
    pub simplify_tolerance: Option<f64>,
    /// Vertices closer than this reuse an earlier vertex.
    pub snap_tolerance: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            enforce_breaklines: true,
            simplify_tolerance: None,
            snap_tolerance: 0.001,
        }
    }
}

impl TriangulationConfig {
    pub fn with_enforce_breaklines(mut self, enforce: bool) -> Self {
        self.enforce_breaklines = enforce;
        self
    }

    pub fn with_simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = Some(tolerance);
        self
    }

    pub fn with_snap_tolerance(mut self, tolerance: f64) -> Self {
        self.snap_tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.snap_tolerance.is_finite() && self.snap_tolerance >= 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "snap tolerance must be non-negative, got {}",
                self.snap_tolerance
            )));
        }
        if let Some(t) = self.simplify_tolerance {
            if !(t.is_finite() && t >= 0.0) {
                return Err(TerrainError::InvalidConfig(format!(
                    "simplify tolerance must be non-negative, got {}",
                    t
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplify_drops_collinear_vertices() {
        let line = Breakline::new(
            "curb",
            BreaklineKind::Hard,
            (0..5)
                .map(|i| BreaklineVertex::new(i as f64, 0.0, Some(i as f64)))
                .collect(),
        );
        let s = line.simplified(0.01);
        assert_eq!(s.vertices.len(), 2);
        assert_eq!(s.vertices[1].z, Some(4.0));
    }

    #[test]
    fn region_kind_serde() {
        let json = serde_json::to_string(&RegionKind::Flat(12.5)).unwrap();
        assert_eq!(json, r#"{"type":"flat","elevation":12.5}"#);
        let back: RegionKind = serde_json::from_str(r#"{"type":"exclusion"}"#).unwrap();
        assert_eq!(back, RegionKind::Exclusion);
    }

    #[test]
    fn config_validation() {
        assert!(TriangulationConfig::default().validate().is_ok());
        assert!(TriangulationConfig::default()
            .with_snap_tolerance(-1.0)
            .validate()
            .is_err());
        assert_eq!(BreaklineKind::parse(" Soft "), Some(BreaklineKind::Soft));
    }
}
