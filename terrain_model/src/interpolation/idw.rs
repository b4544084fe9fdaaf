//! Inverse distance weighting.

use serde::{Deserialize, Serialize};

use super::grid::{rasterize, ElevationGrid, GridConfig};
use crate::cancel::CancelToken;
use crate::error::{Result, TerrainError};
use crate::points::SurveyPoint;
use crate::spatial_index::SpatialIndex;

/// Neighbors closer than this are treated as the query location itself.
pub const EXACT_MATCH_EPSILON: f64 = 1e-10;

/// Bounds for the density-adapted power.
pub const MIN_ADAPTIVE_POWER: f64 = 1.0;
pub const MAX_ADAPTIVE_POWER: f64 = 4.0;

/// Spatial index cells per search radius for grid runs.
const CELLS_PER_RADIUS: f64 = 4.0;

/// Settings for inverse distance weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdwConfig {
    /// Distance exponent.
    pub power: f64,
    pub search_radius: f64,
    /// Fewer neighbors than this within the radius yields no estimate.
    pub min_neighbors: usize,
    /// Only the nearest `max_neighbors` contribute.
    pub max_neighbors: usize,
    /// Added to every distance before raising to `power`.
    pub smoothing: f64,
}

impl Default for IdwConfig {
    fn default() -> Self {
        Self {
            power: 2.0,
            search_radius: 500.0,
            min_neighbors: 3,
            max_neighbors: 12,
            smoothing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwOverrides {
    pub power: Option<f64>,
    pub search_radius: Option<f64>,
    pub min_neighbors: Option<usize>,
    pub max_neighbors: Option<usize>,
    pub smoothing: Option<f64>,
}

impl IdwConfig {
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_search_radius(mut self, radius: f64) -> Self {
        self.search_radius = radius;
        self
    }

    pub fn with_neighbors(mut self, min: usize, max: usize) -> Self {
        self.min_neighbors = min;
        self.max_neighbors = max;
        self
    }

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn apply_overrides(&self, o: &IdwOverrides) -> Self {
        Self {
            power: o.power.unwrap_or(self.power),
            search_radius: o.search_radius.unwrap_or(self.search_radius),
            min_neighbors: o.min_neighbors.unwrap_or(self.min_neighbors),
            max_neighbors: o.max_neighbors.unwrap_or(self.max_neighbors),
            smoothing: o.smoothing.unwrap_or(self.smoothing),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TerrainError::InvalidConfig(msg));
        if !(self.power.is_finite() && self.power > 0.0) {
            return invalid(format!("IDW power must be positive, got {}", self.power));
        }
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return invalid(format!(
                "search radius must be positive, got {}",
                self.search_radius
            ));
        }
        if self.min_neighbors == 0 || self.max_neighbors < self.min_neighbors {
            return invalid(format!(
                "neighbor bounds must satisfy 1 <= min <= max, got {}..{}",
                self.min_neighbors, self.max_neighbors
            ));
        }
        if !(self.smoothing.is_finite() && self.smoothing >= 0.0) {
            return invalid(format!("smoothing must be non-negative, got {}", self.smoothing));
        }
        Ok(())
    }
}

/// How the distance exponent is chosen per estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PowerMode {
    Fixed,
    Adaptive,
}

/// Power scaled by local density: the ratio of the search radius to the
/// mean neighbor distance, relative to a neighborhood spread over half the
/// radius.
pub fn adaptive_power(base_power: f64, search_radius: f64, mean_distance: f64) -> f64 {
    if mean_distance <= EXACT_MATCH_EPSILON {
        return MAX_ADAPTIVE_POWER;
    }
    let density = search_radius / mean_distance / 2.0;
    (base_power * density.sqrt()).clamp(MIN_ADAPTIVE_POWER, MAX_ADAPTIVE_POWER)
}

/// Weighted estimate from `(distance, z)` pairs sorted nearest first.
///
/// Returns the nearest z on an exact match, `None` with fewer than
/// `min_neighbors` pairs, otherwise the weighted mean of the nearest
/// `max_neighbors`.
pub(crate) fn estimate(neighbors: &[(f64, f64)], config: &IdwConfig, mode: PowerMode) -> Option<f64> {
    let &(nearest, z) = neighbors.first()?;
    if nearest <= EXACT_MATCH_EPSILON {
        return Some(z);
    }
    if neighbors.len() < config.min_neighbors {
        return None;
    }
    let used = &neighbors[..neighbors.len().min(config.max_neighbors)];
    let power = match mode {
        PowerMode::Fixed => config.power,
        PowerMode::Adaptive => {
            let mean = used.iter().map(|(d, _)| d).sum::<f64>() / used.len() as f64;
            adaptive_power(config.power, config.search_radius, mean)
        }
    };
    let (mut num, mut den) = (0.0, 0.0);
    for &(d, z) in used {
        let w = 1.0 / (d + config.smoothing).powf(power);
        num += w * z;
        den += w;
    }
    (den > 0.0).then(|| num / den)
}

fn brute_force(x: f64, y: f64, points: &[SurveyPoint], radius: f64) -> Vec<(f64, f64)> {
    let mut found: Vec<(usize, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p.x - x).hypot(p.y - y)))
        .filter(|&(_, d)| d <= radius)
        .collect();
    found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    found.into_iter().map(|(i, d)| (d, points[i].z)).collect()
}

/// IDW estimate at `(x, y)` from a linear scan of `points`. `None` means no
/// data.
pub fn interpolate_idw(x: f64, y: f64, points: &[SurveyPoint], config: &IdwConfig) -> Option<f64> {
    estimate(&brute_force(x, y, points, config.search_radius), config, PowerMode::Fixed)
}

/// As [`interpolate_idw`] with the power adapted to the local neighbor
/// spacing.
pub fn interpolate_adaptive_idw(
    x: f64,
    y: f64,
    points: &[SurveyPoint],
    config: &IdwConfig,
) -> Option<f64> {
    estimate(&brute_force(x, y, points, config.search_radius), config, PowerMode::Adaptive)
}

/// Index-backed estimate; `index` must be built over `points`.
pub(crate) fn estimate_indexed(
    index: &SpatialIndex,
    points: &[SurveyPoint],
    x: f64,
    y: f64,
    config: &IdwConfig,
    mode: PowerMode,
) -> Option<f64> {
    let neighbors: Vec<(f64, f64)> = index
        .query_radius(x, y, config.search_radius, config.max_neighbors)
        .into_iter()
        .map(|n| (n.distance, points[n.index].z))
        .collect();
    estimate(&neighbors, config, mode)
}

pub(crate) fn index_for(points: &[SurveyPoint], config: &IdwConfig) -> Result<SpatialIndex> {
    SpatialIndex::new(points, config.search_radius / CELLS_PER_RADIUS)
}

fn idw_grid(
    points: &[SurveyPoint],
    grid: &GridConfig,
    config: &IdwConfig,
    cancel: Option<&CancelToken>,
    mode: PowerMode,
) -> Result<ElevationGrid> {
    config.validate()?;
    grid.validate()?;
    let index = index_for(points, config)?;
    let result = rasterize(grid, cancel, |x, y| {
        estimate_indexed(&index, points, x, y, config, mode)
    })?;
    log::info!(
        "IDW grid {}x{} from {} points ({} cells without data)",
        result.width,
        result.height,
        points.len(),
        result.statistics.invalid_cells
    );
    Ok(result)
}

/// IDW over every cell of `grid`, using a spatial index with cells a
/// quarter of the search radius.
pub fn interpolate_idw_grid(
    points: &[SurveyPoint],
    grid: &GridConfig,
    config: &IdwConfig,
    cancel: Option<&CancelToken>,
) -> Result<ElevationGrid> {
    idw_grid(points, grid, config, cancel, PowerMode::Fixed)
}

pub fn interpolate_adaptive_idw_grid(
    points: &[SurveyPoint],
    grid: &GridConfig,
    config: &IdwConfig,
    cancel: Option<&CancelToken>,
) -> Result<ElevationGrid> {
    idw_grid(points, grid, config, cancel, PowerMode::Adaptive)
}
