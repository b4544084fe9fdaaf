//! Leave-one-out, k-fold and random-split cross-validation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::metrics::{Prediction, ValidationMetrics};
use super::predictor::SurfacePredictor;
use crate::error::{Result, TerrainError};
use crate::points::SurveyPoint;

/// Points held out by leave-one-out when `max_points` is unset. Each one
/// rebuilds the predictor over the rest of the set.
pub const DEFAULT_LEAVE_ONE_OUT_POINTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidationMethod {
    LeaveOneOut,
    KFold,
    RandomSplit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    pub method: CrossValidationMethod,
    /// Fold count for k-fold.
    pub folds: usize,
    /// Share of points held out per random split.
    pub test_fraction: f64,
    /// Number of random splits.
    pub iterations: usize,
    /// Seed for every shuffle, so runs are repeatable.
    pub seed: u64,
    /// Caps the points evaluated. Leave-one-out holds out the first
    /// `max_points` ([`DEFAULT_LEAVE_ONE_OUT_POINTS`] when unset); the other
    /// methods draw a seeded subsample.
    pub max_points: Option<usize>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            method: CrossValidationMethod::KFold,
            folds: 5,
            test_fraction: 0.2,
            iterations: 5,
            seed: 42,
            max_points: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationOverrides {
    pub method: Option<CrossValidationMethod>,
    pub folds: Option<usize>,
    pub test_fraction: Option<f64>,
    pub iterations: Option<usize>,
    pub seed: Option<u64>,
    pub max_points: Option<usize>,
}

impl CrossValidationConfig {
    pub fn leave_one_out() -> Self {
        Self {
            method: CrossValidationMethod::LeaveOneOut,
            max_points: Some(DEFAULT_LEAVE_ONE_OUT_POINTS),
            ..Default::default()
        }
    }

    pub fn k_fold(folds: usize) -> Self {
        Self {
            method: CrossValidationMethod::KFold,
            folds,
            ..Default::default()
        }
    }

    pub fn random_split(test_fraction: f64, iterations: usize) -> Self {
        Self {
            method: CrossValidationMethod::RandomSplit,
            test_fraction,
            iterations,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = Some(max_points);
        self
    }

    pub fn apply_overrides(&self, o: &CrossValidationOverrides) -> Self {
        Self {
            method: o.method.unwrap_or(self.method),
            folds: o.folds.unwrap_or(self.folds),
            test_fraction: o.test_fraction.unwrap_or(self.test_fraction),
            iterations: o.iterations.unwrap_or(self.iterations),
            seed: o.seed.unwrap_or(self.seed),
            max_points: o.max_points.or(self.max_points),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.method {
            CrossValidationMethod::KFold if self.folds < 2 => Err(TerrainError::InvalidConfig(
                format!("k-fold needs at least 2 folds, got {}", self.folds),
            )),
            CrossValidationMethod::RandomSplit
                if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) =>
            {
                Err(TerrainError::InvalidConfig(format!(
                    "test fraction must lie in (0, 1), got {}",
                    self.test_fraction
                )))
            }
            CrossValidationMethod::RandomSplit if self.iterations == 0 => Err(
                TerrainError::InvalidConfig("random split needs at least one iteration".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Outcome of one cross-validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub method: CrossValidationMethod,
    pub predictor: String,
    /// Over every held-out point.
    pub metrics: ValidationMetrics,
    /// Per fold (k-fold) or per iteration (random split); empty for
    /// leave-one-out.
    pub folds: Vec<ValidationMetrics>,
    pub predictions: Vec<Prediction>,
}

fn evaluate(
    predictor: &dyn SurfacePredictor,
    points: &[SurveyPoint],
    test: &[usize],
) -> Vec<Prediction> {
    let mut is_test = vec![false; points.len()];
    for &i in test {
        is_test[i] = true;
    }
    let training: Vec<SurveyPoint> = points
        .iter()
        .zip(&is_test)
        .filter(|(_, t)| !**t)
        .map(|(p, _)| p.clone())
        .collect();
    let targets: Vec<SurveyPoint> = test.iter().map(|&i| points[i].clone()).collect();
    let estimates = predictor.fit_predict(&training, &targets);
    targets
        .into_iter()
        .zip(estimates)
        .map(|(t, predicted)| Prediction {
            id: t.id,
            actual: t.z,
            predicted,
        })
        .collect()
}

/// Cross-validates `predictor` on `points`.
///
/// Folds and iterations run in parallel; each produces its own predictions
/// which are concatenated in fold order afterwards.
pub fn cross_validate(
    points: &[SurveyPoint],
    predictor: &dyn SurfacePredictor,
    config: &CrossValidationConfig,
) -> Result<CrossValidationResult> {
    config.validate()?;
    if points.len() < 2 {
        return Err(TerrainError::InvalidConfig(format!(
            "cross-validation needs at least two points, got {}",
            points.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let sample: Vec<SurveyPoint> = match (config.method, config.max_points) {
        (CrossValidationMethod::LeaveOneOut, _) | (_, None) => points.to_vec(),
        (_, Some(max)) if max >= points.len() => points.to_vec(),
        (_, Some(max)) => {
            let mut order: Vec<usize> = (0..points.len()).collect();
            order.shuffle(&mut rng);
            order.truncate(max.max(2));
            order.sort_unstable();
            order.into_iter().map(|i| points[i].clone()).collect()
        }
    };
    let n = sample.len();

    let (predictions, folds) = match config.method {
        CrossValidationMethod::LeaveOneOut => {
            let held_out = config
                .max_points
                .unwrap_or(DEFAULT_LEAVE_ONE_OUT_POINTS)
                .min(n);
            let predictions: Vec<Prediction> = (0..held_out)
                .into_par_iter()
                .flat_map_iter(|i| evaluate(predictor, &sample, &[i]))
                .collect();
            (predictions, Vec::new())
        }
        CrossValidationMethod::KFold => {
            if n < config.folds {
                return Err(TerrainError::InvalidConfig(format!(
                    "{} points cannot fill {} folds",
                    n, config.folds
                )));
            }
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);
            let parts: Vec<Vec<usize>> = (0..config.folds)
                .map(|f| order.iter().skip(f).step_by(config.folds).copied().collect())
                .collect();
            run_partitions(predictor, &sample, &parts)
        }
        CrossValidationMethod::RandomSplit => {
            let test_len = ((n as f64 * config.test_fraction).round() as usize).clamp(1, n - 1);
            let parts: Vec<Vec<usize>> = (0..config.iterations)
                .map(|it| {
                    let mut split_rng = StdRng::seed_from_u64(config.seed.wrapping_add(it as u64));
                    let mut order: Vec<usize> = (0..n).collect();
                    order.shuffle(&mut split_rng);
                    order.truncate(test_len);
                    order
                })
                .collect();
            run_partitions(predictor, &sample, &parts)
        }
    };

    let metrics = ValidationMetrics::from_predictions(&predictions);
    log::info!(
        "{:?} validation of {}: RMSE {:.4}, R² {:.4} ({} compared, {} excluded)",
        config.method,
        predictor.name(),
        metrics.rmse,
        metrics.r_squared,
        metrics.count,
        metrics.excluded
    );
    Ok(CrossValidationResult {
        method: config.method,
        predictor: predictor.name(),
        metrics,
        folds,
        predictions,
    })
}

fn run_partitions(
    predictor: &dyn SurfacePredictor,
    points: &[SurveyPoint],
    parts: &[Vec<usize>],
) -> (Vec<Prediction>, Vec<ValidationMetrics>) {
    let per_part: Vec<Vec<Prediction>> = parts
        .par_iter()
        .map(|test| evaluate(predictor, points, test))
        .collect();
    let folds = per_part
        .iter()
        .map(|p| ValidationMetrics::from_predictions(p))
        .collect();
    (per_part.into_iter().flatten().collect(), folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::IdwConfig;
    use crate::validation::{IdwPredictor, TinPredictor};

    fn plane(n: usize) -> Vec<SurveyPoint> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f64 * 2.0, j as f64 * 2.0);
                pts.push(SurveyPoint::new(format!("{i}-{j}"), x, y, 3.0 * x - y + 7.0));
            }
        }
        pts
    }

    #[test]
    fn k_fold_keeps_per_fold_metrics() {
        let pts = plane(8);
        let idw = IdwPredictor::new(IdwConfig::default().with_search_radius(10.0));
        let r = cross_validate(&pts, &idw, &CrossValidationConfig::k_fold(4)).unwrap();
        assert_eq!(r.folds.len(), 4);
        assert_eq!(r.predictions.len(), 64);
        assert_eq!(r.folds.iter().map(|f| f.count + f.excluded).sum::<usize>(), 64);
        assert_eq!(r.metrics.count + r.metrics.excluded, 64);
    }

    #[test]
    fn seeded_runs_repeat() {
        let pts = plane(6);
        let idw = IdwPredictor::new(IdwConfig::default().with_search_radius(10.0));
        let config = CrossValidationConfig::random_split(0.25, 3).with_seed(7);
        let a = cross_validate(&pts, &idw, &config).unwrap();
        let b = cross_validate(&pts, &idw, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.folds.len(), 3);
        assert_eq!(a.predictions.len(), 27);
    }

    #[test]
    fn leave_one_out_on_plane_tin_is_near_exact_inside() {
        let pts = plane(6);
        let r = cross_validate(&pts, &TinPredictor::default(), &CrossValidationConfig::leave_one_out())
            .unwrap();
        assert!(r.folds.is_empty());
        // only the four corners fall outside the hull of the remaining points
        assert!(r.metrics.rmse < 1e-9);
        assert_eq!(r.metrics.count, 32);
        assert_eq!(r.metrics.excluded, 4);
    }

    #[test]
    fn leave_one_out_respects_max_points() {
        let pts = plane(5);
        let idw = IdwPredictor::new(IdwConfig::default());
        let config = CrossValidationConfig::leave_one_out().with_max_points(7);
        let r = cross_validate(&pts, &idw, &config).unwrap();
        assert_eq!(r.predictions.len(), 7);
        assert_eq!(r.predictions[0].id, "0-0");
    }

    #[test]
    fn leave_one_out_is_capped_by_default() {
        let pts = plane(12);
        let idw = IdwPredictor::new(IdwConfig::default());
        let config = CrossValidationConfig::leave_one_out();
        assert_eq!(config.max_points, Some(DEFAULT_LEAVE_ONE_OUT_POINTS));
        let r = cross_validate(&pts, &idw, &config).unwrap();
        assert_eq!(r.predictions.len(), DEFAULT_LEAVE_ONE_OUT_POINTS);

        let unset = CrossValidationConfig {
            method: CrossValidationMethod::LeaveOneOut,
            ..Default::default()
        };
        let r = cross_validate(&pts, &idw, &unset).unwrap();
        assert_eq!(r.predictions.len(), DEFAULT_LEAVE_ONE_OUT_POINTS);

        let r = cross_validate(&pts, &idw, &config.with_max_points(144)).unwrap();
        assert_eq!(r.predictions.len(), 144);
    }

    #[test]
    fn invalid_settings() {
        let pts = plane(2);
        let idw = IdwPredictor::new(IdwConfig::default());
        assert!(cross_validate(&pts, &idw, &CrossValidationConfig::k_fold(1)).is_err());
        assert!(cross_validate(&pts, &idw, &CrossValidationConfig::k_fold(5)).is_err());
        assert!(cross_validate(&pts, &idw, &CrossValidationConfig::random_split(1.0, 2)).is_err());
        assert!(cross_validate(&pts[..1], &idw, &CrossValidationConfig::leave_one_out()).is_err());
    }
}
