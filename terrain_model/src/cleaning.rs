//! Point cleaning: duplicate removal, statistical outliers and DEM fusion.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::dataset::elevation_moments;
use crate::error::{Result, TerrainError};
use crate::points::{PointSource, SurveyPoint};
use crate::spatial_index::SpatialIndex;

/// Below this many points the variance estimate is not trusted and outlier
/// removal does nothing.
pub const MIN_POINTS_FOR_OUTLIERS: usize = 10;

/// Settings for [`clean_points`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Coordinates closer than this (per axis, after rounding) are duplicates.
    pub duplicate_tolerance: f64,
    /// Z-score above which a point is an outlier.
    pub outlier_threshold: f64,
    pub remove_duplicates: bool,
    pub remove_outliers: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            duplicate_tolerance: 0.001,
            outlier_threshold: 3.0,
            remove_duplicates: true,
            remove_outliers: true,
        }
    }
}

/// Partial settings layered over [`CleaningConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningOverrides {
    pub duplicate_tolerance: Option<f64>,
    pub outlier_threshold: Option<f64>,
    pub remove_duplicates: Option<bool>,
    pub remove_outliers: Option<bool>,
}

impl CleaningConfig {
    /// Returns `self` with every `Some` override applied.
    pub fn apply_overrides(&self, o: &CleaningOverrides) -> Self {
        Self {
            duplicate_tolerance: o.duplicate_tolerance.unwrap_or(self.duplicate_tolerance),
            outlier_threshold: o.outlier_threshold.unwrap_or(self.outlier_threshold),
            remove_duplicates: o.remove_duplicates.unwrap_or(self.remove_duplicates),
            remove_outliers: o.remove_outliers.unwrap_or(self.remove_outliers),
        }
    }

    pub fn with_duplicate_tolerance(mut self, tolerance: f64) -> Self {
        self.duplicate_tolerance = tolerance;
        self
    }

    pub fn with_outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.duplicate_tolerance.is_finite() && self.duplicate_tolerance > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "duplicate tolerance must be positive, got {}",
                self.duplicate_tolerance
            )));
        }
        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "outlier threshold must be positive, got {}",
                self.outlier_threshold
            )));
        }
        Ok(())
    }
}

/// Result of [`remove_duplicates`].
#[derive(Debug, Clone)]
pub struct DedupResult {
    pub points: Vec<SurveyPoint>,
    pub removed_count: usize,
}

/// Result of [`remove_outliers`].
#[derive(Debug, Clone)]
pub struct OutlierResult {
    pub points: Vec<SurveyPoint>,
    pub outliers: Vec<SurveyPoint>,
}

impl OutlierResult {
    pub fn outlier_count(&self) -> usize {
        self.outliers.len()
    }
}

/// Number of digits after the decimal point in the shortest representation
/// of `value`.
fn decimal_places(value: f64) -> usize {
    let text = value.to_string();
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

fn grid_key(p: &SurveyPoint, tolerance: f64) -> (i64, i64) {
    if tolerance > 0.0 {
        ((p.x / tolerance).round() as i64, (p.y / tolerance).round() as i64)
    } else {
        (p.x.to_bits() as i64, p.y.to_bits() as i64)
    }
}

/// Removes points whose XY coordinates coincide after rounding to
/// `tolerance`.
///
/// When two points collide, the one whose z carries more decimal places is
/// kept (surveyed values tend to be recorded with more precision than
/// interpolated ones); on a tie the earlier point wins. Output order follows
/// the first occurrence of each coordinate. Running it twice removes nothing
/// the second time.
pub fn remove_duplicates(points: &[SurveyPoint], tolerance: f64) -> DedupResult {
    let mut slots: FxHashMap<(i64, i64), usize> =
        FxHashMap::with_capacity_and_hasher(points.len(), Default::default());
    let mut kept: Vec<SurveyPoint> = Vec::with_capacity(points.len());
    let mut removed_count = 0;
    for p in points {
        match slots.get(&grid_key(p, tolerance)) {
            Some(&slot) => {
                removed_count += 1;
                if decimal_places(p.z) > decimal_places(kept[slot].z) {
                    kept[slot] = p.clone();
                }
            }
            None => {
                slots.insert(grid_key(p, tolerance), kept.len());
                kept.push(p.clone());
            }
        }
    }
    if removed_count > 0 {
        log::debug!("removed {} duplicate points", removed_count);
    }
    DedupResult {
        points: kept,
        removed_count,
    }
}

/// Removes points whose elevation z-score exceeds `threshold`.
///
/// Sets with fewer than [`MIN_POINTS_FOR_OUTLIERS`] points, or with no
/// elevation spread, are returned unchanged.
pub fn remove_outliers(points: &[SurveyPoint], threshold: f64) -> OutlierResult {
    let unchanged = || OutlierResult {
        points: points.to_vec(),
        outliers: Vec::new(),
    };
    if points.len() < MIN_POINTS_FOR_OUTLIERS {
        return unchanged();
    }
    let Some((mean, std_dev)) = elevation_moments(points) else {
        return unchanged();
    };
    if std_dev <= f64::EPSILON {
        return unchanged();
    }
    let (outliers, kept): (Vec<SurveyPoint>, Vec<SurveyPoint>) = points
        .iter()
        .cloned()
        .partition(|p| ((p.z - mean) / std_dev).abs() > threshold);
    if !outliers.is_empty() {
        log::debug!(
            "removed {} elevation outliers (mean {:.3}, std dev {:.3})",
            outliers.len(),
            mean,
            std_dev
        );
    }
    OutlierResult {
        points: kept,
        outliers,
    }
}

/// Outcome of the full cleaning pass.
#[derive(Debug, Clone)]
pub struct CleaningReport {
    pub points: Vec<SurveyPoint>,
    pub duplicates_removed: usize,
    pub outliers_removed: usize,
    pub outliers: Vec<SurveyPoint>,
    pub warnings: Vec<String>,
}

/// Deduplicates and then removes outliers according to `config`. Never
/// fails; invalid settings fall back to the defaults with a warning.
pub fn clean_points(points: &[SurveyPoint], config: &CleaningConfig) -> CleaningReport {
    let mut warnings = Vec::new();
    let config = match config.validate() {
        Ok(()) => config.clone(),
        Err(e) => {
            log::warn!("{}; using default cleaning settings", e);
            warnings.push(format!("{}; defaults used", e));
            CleaningConfig::default()
        }
    };

    let (points, duplicates_removed) = if config.remove_duplicates {
        let r = remove_duplicates(points, config.duplicate_tolerance);
        (r.points, r.removed_count)
    } else {
        (points.to_vec(), 0)
    };
    if duplicates_removed > 0 {
        warnings.push(format!("{} duplicate points removed", duplicates_removed));
    }

    let (points, outliers) = if config.remove_outliers {
        if points.len() < MIN_POINTS_FOR_OUTLIERS {
            warnings.push(format!(
                "outlier removal skipped: {} points (< {})",
                points.len(),
                MIN_POINTS_FOR_OUTLIERS
            ));
        }
        let r = remove_outliers(&points, config.outlier_threshold);
        (r.points, r.outliers)
    } else {
        (points, Vec::new())
    };
    if !outliers.is_empty() {
        warnings.push(format!("{} elevation outliers removed", outliers.len()));
    }

    CleaningReport {
        points,
        duplicates_removed,
        outliers_removed: outliers.len(),
        outliers,
        warnings,
    }
}

/// Appends DEM samples to `survey`, skipping any sample within
/// `min_spacing` of a survey point so field measurements take priority.
/// Kept samples are tagged [`PointSource::DemSample`].
pub fn fuse_dem_samples(
    survey: &[SurveyPoint],
    dem: &[SurveyPoint],
    min_spacing: f64,
) -> Vec<SurveyPoint> {
    let mut fused = survey.to_vec();
    let index = if min_spacing > 0.0 && !survey.is_empty() {
        SpatialIndex::new(survey, min_spacing).ok()
    } else {
        None
    };
    let mut skipped = 0;
    for sample in dem {
        let too_close = index
            .as_ref()
            .map(|idx| !idx.query_radius(sample.x, sample.y, min_spacing, 1).is_empty())
            .unwrap_or(false);
        if too_close {
            skipped += 1;
            continue;
        }
        fused.push(sample.clone().with_source(PointSource::DemSample));
    }
    log::info!(
        "fused {} DEM samples ({} skipped near survey points)",
        dem.len() - skipped,
        skipped
    );
    fused
}
