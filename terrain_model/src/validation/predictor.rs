//! Methods that can be cross-validated.

use crate::dtm::{triangulate, TriangulationConfig};
use crate::interpolation::{estimate_indexed, index_for, IdwConfig, PowerMode};
use crate::points::SurveyPoint;

/// A surface method that estimates elevations from training points.
pub trait SurfacePredictor: Sync {
    /// Label used in comparisons.
    fn name(&self) -> String;

    /// One estimate per target, `None` where the method has no value.
    fn fit_predict(&self, training: &[SurveyPoint], targets: &[SurveyPoint]) -> Vec<Option<f64>>;
}

#[derive(Debug, Clone)]
pub struct IdwPredictor {
    pub config: IdwConfig,
    pub adaptive: bool,
}

impl IdwPredictor {
    pub fn new(config: IdwConfig) -> Self {
        Self {
            config,
            adaptive: false,
        }
    }

    pub fn adaptive(config: IdwConfig) -> Self {
        Self {
            config,
            adaptive: true,
        }
    }
}

impl SurfacePredictor for IdwPredictor {
    fn name(&self) -> String {
        let kind = if self.adaptive { "adaptive IDW" } else { "IDW" };
        format!(
            "{} (power {}, radius {}, {}-{} neighbors)",
            kind,
            self.config.power,
            self.config.search_radius,
            self.config.min_neighbors,
            self.config.max_neighbors
        )
    }

    fn fit_predict(&self, training: &[SurveyPoint], targets: &[SurveyPoint]) -> Vec<Option<f64>> {
        let Ok(index) = index_for(training, &self.config) else {
            return vec![None; targets.len()];
        };
        let mode = if self.adaptive {
            PowerMode::Adaptive
        } else {
            PowerMode::Fixed
        };
        targets
            .iter()
            .map(|t| estimate_indexed(&index, training, t.x, t.y, &self.config, mode))
            .collect()
    }
}

/// Barycentric sampling of a TIN built from the training points.
#[derive(Debug, Clone, Default)]
pub struct TinPredictor {
    pub config: TriangulationConfig,
}

impl SurfacePredictor for TinPredictor {
    fn name(&self) -> String {
        "TIN (Delaunay)".to_string()
    }

    fn fit_predict(&self, training: &[SurveyPoint], targets: &[SurveyPoint]) -> Vec<Option<f64>> {
        match triangulate(training, &[], &[], &self.config) {
            Ok(tin) => targets.iter().map(|t| tin.elevation_at(t.x, t.y)).collect(),
            Err(e) => {
                log::warn!("TIN predictor failed: {}", e);
                vec![None; targets.len()]
            }
        }
    }
}
