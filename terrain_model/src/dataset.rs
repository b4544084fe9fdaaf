//! Point datasets with derived bounds and statistics.

use serde::{Deserialize, Serialize};

use crate::cleaning::{self, CleaningConfig, CleaningReport};
use crate::points::{PointSource, SurveyPoint};

/// Axis-aligned extent of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl BoundingBox {
    /// Builds a box directly from its corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            min_z: 0.0,
            max_x,
            max_y,
            max_z: 0.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Planimetric area.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Computes the bounds of `points`, `None` when empty.
pub fn calculate_bounds(points: &[SurveyPoint]) -> Option<BoundingBox> {
    let first = points.first()?;
    let init = BoundingBox {
        min_x: first.x,
        min_y: first.y,
        min_z: first.z,
        max_x: first.x,
        max_y: first.y,
        max_z: first.z,
    };
    Some(points.iter().skip(1).fold(init, |b, p| BoundingBox {
        min_x: b.min_x.min(p.x),
        min_y: b.min_y.min(p.y),
        min_z: b.min_z.min(p.z),
        max_x: b.max_x.max(p.x),
        max_y: b.max_y.max(p.y),
        max_z: b.max_z.max(p.z),
    }))
}

/// Mean and population standard deviation of the elevations (two pass).
pub fn elevation_moments(points: &[SurveyPoint]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.z).sum::<f64>() / n;
    let var = points.iter().map(|p| (p.z - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Descriptive statistics of a dataset. Always derived, never edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub point_count: usize,
    pub area: f64,
    /// Points per unit area; zero when the extent has no area.
    pub density: f64,
    pub elevation_mean: f64,
    pub elevation_std_dev: f64,
    pub elevation_min: f64,
    pub elevation_max: f64,
    pub duplicates_removed: usize,
    pub outliers_removed: usize,
}

/// Computes statistics for `points`; the removal counts are carried over
/// from the cleaning pass that produced them.
pub fn calculate_statistics(
    points: &[SurveyPoint],
    duplicates_removed: usize,
    outliers_removed: usize,
) -> DatasetStatistics {
    let Some(bounds) = calculate_bounds(points) else {
        return DatasetStatistics {
            duplicates_removed,
            outliers_removed,
            ..Default::default()
        };
    };
    let (mean, std_dev) = elevation_moments(points).unwrap_or_default();
    let area = bounds.area();
    let density = if area > f64::EPSILON {
        points.len() as f64 / area
    } else {
        0.0
    };
    DatasetStatistics {
        point_count: points.len(),
        area,
        density,
        elevation_mean: mean,
        elevation_std_dev: std_dev,
        elevation_min: bounds.min_z,
        elevation_max: bounds.max_z,
        duplicates_removed,
        outliers_removed,
    }
}

/// An immutable point set with its bounds and statistics.
///
/// Any change to the points (cleaning, fusion) produces a new dataset so the
/// derived values are always in sync with the points they describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointDataset {
    id: String,
    points: Vec<SurveyPoint>,
    bounds: Option<BoundingBox>,
    statistics: DatasetStatistics,
}

impl PointDataset {
    pub fn new(id: impl Into<String>, points: Vec<SurveyPoint>) -> Self {
        Self::with_counts(id.into(), points, 0, 0)
    }

    fn with_counts(id: String, points: Vec<SurveyPoint>, dups: usize, outliers: usize) -> Self {
        let bounds = calculate_bounds(&points);
        let statistics = calculate_statistics(&points, dups, outliers);
        Self {
            id,
            points,
            bounds,
            statistics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn points(&self) -> &[SurveyPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn statistics(&self) -> &DatasetStatistics {
        &self.statistics
    }

    /// Runs the cleaning pipeline and returns the cleaned dataset.
    pub fn clean(&self, config: &CleaningConfig) -> (PointDataset, CleaningReport) {
        let report = cleaning::clean_points(&self.points, config);
        let dataset = Self::with_counts(
            self.id.clone(),
            report.points.clone(),
            report.duplicates_removed,
            report.outliers_removed,
        );
        (dataset, report)
    }

    /// Merges DEM samples into this dataset, dropping samples closer than
    /// `min_spacing` to an existing point.
    pub fn fuse_dem_samples(&self, dem: &[SurveyPoint], min_spacing: f64) -> PointDataset {
        let fused = cleaning::fuse_dem_samples(&self.points, dem, min_spacing);
        Self::with_counts(
            self.id.clone(),
            fused,
            self.statistics.duplicates_removed,
            self.statistics.outliers_removed,
        )
    }

    /// Number of points per provenance tag.
    pub fn count_by_source(&self, source: PointSource) -> usize {
        self.points.iter().filter(|p| p.source == source).count()
    }
}
