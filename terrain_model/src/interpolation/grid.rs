//! Raster definition, row-parallel rasterisation and streaming statistics.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::dataset::BoundingBox;
use crate::error::{Result, TerrainError};

/// Rows handed to the thread pool between cancellation checks.
pub const ROW_BATCH: usize = 32;

/// Largest raster accepted by [`GridConfig::validate`].
pub const MAX_GRID_CELLS: usize = 500_000_000;

pub const DEFAULT_NO_DATA: f64 = -9999.0;

/// Output raster layout. Row 0 is the northern edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub bounds: BoundingBox,
    /// Cell size in distance units.
    pub resolution: f64,
    /// Value written to cells without an estimate.
    pub no_data: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOverrides {
    pub resolution: Option<f64>,
    pub no_data: Option<f64>,
}

impl GridConfig {
    /// Grid over `bounds` with the default no-data value.
    pub fn covering(bounds: BoundingBox, resolution: f64) -> Self {
        Self {
            bounds,
            resolution,
            no_data: DEFAULT_NO_DATA,
        }
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn apply_overrides(&self, o: &GridOverrides) -> Self {
        Self {
            bounds: self.bounds,
            resolution: o.resolution.unwrap_or(self.resolution),
            no_data: o.no_data.unwrap_or(self.no_data),
        }
    }

    /// `(width, height)` in cells; at least one cell per axis.
    pub fn dimensions(&self) -> (usize, usize) {
        let cells = |extent: f64| ((extent / self.resolution).ceil() as usize).max(1);
        (cells(self.bounds.width()), cells(self.bounds.height()))
    }

    pub fn col_center(&self, col: usize) -> f64 {
        self.bounds.min_x + (col as f64 + 0.5) * self.resolution
    }

    pub fn row_center(&self, row: usize) -> f64 {
        self.bounds.max_y - (row as f64 + 0.5) * self.resolution
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "grid resolution must be positive, got {}",
                self.resolution
            )));
        }
        let b = &self.bounds;
        let finite = [b.min_x, b.min_y, b.max_x, b.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || b.width() < 0.0 || b.height() < 0.0 {
            return Err(TerrainError::InvalidConfig(
                "grid bounds must be finite with min <= max".into(),
            ));
        }
        let (w, h) = self.dimensions();
        if w.saturating_mul(h) > MAX_GRID_CELLS {
            return Err(TerrainError::InvalidConfig(format!(
                "grid of {}x{} cells exceeds the {} cell limit",
                w, h, MAX_GRID_CELLS
            )));
        }
        Ok(())
    }
}

/// Summary of the valid cells of a raster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStatistics {
    pub valid_cells: usize,
    pub invalid_cells: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
}

/// Running count, mean, sum of squared deviations and extrema.
///
/// Partials from different rows are combined with [`merge`](Self::merge)
/// (Chan's pairwise update), never by sharing one accumulator.
#[derive(Debug, Clone, Copy)]
pub struct StreamingStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for StreamingStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl StreamingStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let n = self.count + other.count;
        let delta = other.mean - self.mean;
        let (na, nb) = (self.count as f64, other.count as f64);
        Self {
            count: n,
            mean: self.mean + delta * nb / n as f64,
            m2: self.m2 + other.m2 + delta * delta * na * nb / n as f64,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self, total_cells: usize) -> GridStatistics {
        let valid = self.count as usize;
        if valid == 0 {
            return GridStatistics {
                valid_cells: 0,
                invalid_cells: total_cells,
                ..Default::default()
            };
        }
        GridStatistics {
            valid_cells: valid,
            invalid_cells: total_cells - valid,
            min: Some(self.min),
            max: Some(self.max),
            mean: Some(self.mean),
            std_dev: Some((self.m2 / self.count as f64).max(0.0).sqrt()),
        }
    }
}

/// Row-major elevation raster, north row first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationGrid {
    pub width: usize,
    pub height: usize,
    /// West edge.
    pub origin_x: f64,
    /// North edge.
    pub origin_y: f64,
    pub resolution: f64,
    pub no_data: f64,
    pub values: Vec<f64>,
    pub statistics: GridStatistics,
    pub compute_time_ms: f64,
}

impl ElevationGrid {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell value, `None` for no-data or out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let v = self.values[row * self.width + col];
        (v != self.no_data).then_some(v)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.resolution,
            self.origin_y - (row as f64 + 0.5) * self.resolution,
        )
    }

    /// Value of the cell containing `(x, y)`.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let col = ((x - self.origin_x) / self.resolution).floor();
        let row = ((self.origin_y - y) / self.resolution).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        self.get(row as usize, col as usize)
    }
}

/// Evaluates `sample` at every cell center of `config`.
///
/// Rows are computed in parallel in batches of [`ROW_BATCH`]; `cancel` is
/// checked before each batch. `sample` returning `None` writes the no-data
/// value.
pub fn rasterize<F>(config: &GridConfig, cancel: Option<&CancelToken>, sample: F) -> Result<ElevationGrid>
where
    F: Fn(f64, f64) -> Option<f64> + Sync,
{
    config.validate()?;
    let started = Instant::now();
    let (width, height) = config.dimensions();
    let mut values = vec![config.no_data; width * height];
    let mut stats = StreamingStats::default();

    for (batch, rows) in values.chunks_mut(width * ROW_BATCH).enumerate() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            log::warn!("grid cancelled after {} of {} rows", batch * ROW_BATCH, height);
            return Err(TerrainError::Cancelled);
        }
        let first_row = batch * ROW_BATCH;
        let partial = rows
            .par_chunks_mut(width)
            .enumerate()
            .map(|(r, row)| {
                let y = config.row_center(first_row + r);
                let mut acc = StreamingStats::default();
                for (c, cell) in row.iter_mut().enumerate() {
                    if let Some(z) = sample(config.col_center(c), y) {
                        *cell = z;
                        acc.push(z);
                    }
                }
                acc
            })
            .reduce(StreamingStats::default, StreamingStats::merge);
        stats = stats.merge(partial);
    }

    let statistics = stats.finish(width * height);
    let compute_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    log::debug!(
        "grid {}x{}: {} valid, {} no-data in {:.1} ms",
        width,
        height,
        statistics.valid_cells,
        statistics.invalid_cells,
        compute_time_ms
    );
    Ok(ElevationGrid {
        width,
        height,
        origin_x: config.bounds.min_x,
        origin_y: config.bounds.max_y,
        resolution: config.resolution,
        no_data: config.no_data,
        values,
        statistics,
        compute_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GridConfig {
        GridConfig::covering(BoundingBox::new(0.0, 0.0, 10.0, 5.0), 1.0)
    }

    #[test]
    fn dimensions_and_centers() {
        let c = config();
        assert_eq!(c.dimensions(), (10, 5));
        assert_eq!(c.col_center(0), 0.5);
        assert_eq!(c.row_center(0), 4.5);
        let thin = GridConfig::covering(BoundingBox::new(0.0, 0.0, 0.0, 2.5), 1.0);
        assert_eq!(thin.dimensions(), (1, 3));
    }

    #[test]
    fn rasterize_fills_row_major_north_first() {
        let grid = rasterize(&config(), None, |x, y| Some(x + 100.0 * y)).unwrap();
        assert_eq!(grid.len(), 50);
        assert_eq!(grid.values[0], 0.5 + 450.0);
        assert_eq!(grid.values[49], 9.5 + 50.0);
        assert_eq!(grid.get(4, 9), Some(59.5));
        assert_eq!(grid.value_at(3.2, 4.9), Some(3.5 + 450.0));
        assert_eq!(grid.statistics.valid_cells, 50);
    }

    #[test]
    fn no_data_cells_are_excluded_from_statistics() {
        let grid = rasterize(&config(), None, |x, _| (x < 5.0).then_some(2.0)).unwrap();
        assert_eq!(grid.statistics.valid_cells, 25);
        assert_eq!(grid.statistics.invalid_cells, 25);
        assert_eq!(grid.statistics.mean, Some(2.0));
        assert_eq!(grid.statistics.std_dev, Some(0.0));
        assert_eq!(grid.get(0, 7), None);
        assert_eq!(grid.values[7], DEFAULT_NO_DATA);
    }

    #[test]
    fn merged_stats_match_sequential() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin() * 50.0).collect();
        let mut whole = StreamingStats::default();
        values.iter().for_each(|&v| whole.push(v));
        let merged = values
            .chunks(77)
            .map(|chunk| {
                let mut s = StreamingStats::default();
                chunk.iter().for_each(|&v| s.push(v));
                s
            })
            .fold(StreamingStats::default(), StreamingStats::merge);
        let (a, b) = (whole.finish(1000), merged.finish(1000));
        assert!((a.mean.unwrap() - b.mean.unwrap()).abs() < 1e-9);
        assert!((a.std_dev.unwrap() - b.std_dev.unwrap()).abs() < 1e-9);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
    }

    #[test]
    fn cancelled_before_first_batch() {
        let token = CancelToken::new();
        token.cancel();
        let err = rasterize(&config(), Some(&token), |_, _| Some(1.0)).unwrap_err();
        assert!(matches!(err, TerrainError::Cancelled));
    }

    #[test]
    fn invalid_configs() {
        assert!(config().apply_overrides(&GridOverrides {
            resolution: Some(0.0),
            ..Default::default()
        })
        .validate()
        .is_err());
        let huge = GridConfig::covering(BoundingBox::new(0.0, 0.0, 1e6, 1e6), 0.01);
        assert!(huge.validate().is_err());
    }
}
