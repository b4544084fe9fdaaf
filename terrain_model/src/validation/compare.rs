//! Ranking several methods under the same cross-validation.

use serde::{Deserialize, Serialize};

use super::cross::{cross_validate, CrossValidationConfig, CrossValidationResult};
use super::metrics::ValidationMetrics;
use super::predictor::SurfacePredictor;
use crate::error::{Result, TerrainError};
use crate::points::SurveyPoint;

/// Share of the score driven by RMSE; the rest comes from R².
pub const RMSE_WEIGHT: f64 = 0.6;
pub const R_SQUARED_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodScore {
    pub name: String,
    /// 0 to 100, higher is better.
    pub score: f64,
    pub validation: CrossValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodComparison {
    /// Best first; equal scores keep the input order.
    pub rankings: Vec<MethodScore>,
    pub best_method: String,
    pub rationale: String,
}

/// Combines RMSE relative to the best RMSE and clamped R² into one score,
/// scaled by the share of held-out points the method could predict.
/// Methods that predicted nothing score zero.
pub fn score(metrics: &ValidationMetrics, best_rmse: f64) -> f64 {
    if metrics.count == 0 {
        return 0.0;
    }
    let rmse_part = if metrics.rmse <= 0.0 {
        100.0
    } else {
        100.0 * (best_rmse / metrics.rmse).min(1.0)
    };
    let r2_part = 100.0 * metrics.r_squared.clamp(0.0, 1.0);
    let coverage = metrics.count as f64 / (metrics.count + metrics.excluded) as f64;
    coverage * (RMSE_WEIGHT * rmse_part + R_SQUARED_WEIGHT * r2_part)
}

fn rationale(rankings: &[MethodScore]) -> String {
    let best = &rankings[0];
    let m = &best.validation.metrics;
    let mut text = format!(
        "{} scored {:.1}/100 with RMSE {:.3}, MAE {:.3}, R² {:.3} and bias {:+.3} over {} held-out points",
        best.name, best.score, m.rmse, m.mae, m.r_squared, m.bias, m.count
    );
    if m.excluded > 0 {
        text.push_str(&format!(
            " ({} without a prediction, score scaled to {:.0}% coverage)",
            m.excluded,
            100.0 * m.count as f64 / (m.count + m.excluded) as f64
        ));
    }
    if let Some(next) = rankings.get(1) {
        text.push_str(&format!(
            "; runner-up {} scored {:.1} (RMSE {:.3})",
            next.name, next.score, next.validation.metrics.rmse
        ));
    }
    text
}

/// Cross-validates every candidate with the same settings and ranks them.
pub fn compare_methods(
    points: &[SurveyPoint],
    candidates: &[&dyn SurfacePredictor],
    config: &CrossValidationConfig,
) -> Result<MethodComparison> {
    if candidates.is_empty() {
        return Err(TerrainError::InvalidConfig("no methods to compare".into()));
    }
    let results = candidates
        .iter()
        .map(|c| cross_validate(points, *c, config))
        .collect::<Result<Vec<_>>>()?;
    let best_rmse = results
        .iter()
        .filter(|r| r.metrics.count > 0)
        .map(|r| r.metrics.rmse)
        .fold(f64::INFINITY, f64::min);

    let mut rankings: Vec<MethodScore> = results
        .into_iter()
        .map(|validation| MethodScore {
            name: validation.predictor.clone(),
            score: score(&validation.metrics, best_rmse),
            validation,
        })
        .collect();
    rankings.sort_by(|a, b| b.score.total_cmp(&a.score));

    let best_method = rankings[0].name.clone();
    let rationale = rationale(&rankings);
    log::info!("best method: {}", rationale);
    Ok(MethodComparison {
        rankings,
        best_method,
        rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::IdwConfig;
    use crate::validation::{IdwPredictor, TinPredictor};

    fn metrics(rmse: f64, r_squared: f64) -> ValidationMetrics {
        ValidationMetrics {
            rmse,
            r_squared,
            count: 10,
            ..Default::default()
        }
    }

    #[test]
    fn score_weights() {
        assert!((score(&metrics(1.0, 1.0), 1.0) - 100.0).abs() < 1e-12);
        assert!((score(&metrics(2.0, 0.5), 1.0) - (30.0 + 20.0)).abs() < 1e-12);
        assert!((score(&metrics(1.0, -3.0), 1.0) - 60.0).abs() < 1e-12);
        assert_eq!(score(&ValidationMetrics::default(), 1.0), 0.0);
    }

    #[test]
    fn unpredicted_points_lower_the_score() {
        let full = metrics(1.0, 1.0);
        let half = ValidationMetrics {
            excluded: 10,
            ..metrics(1.0, 1.0)
        };
        assert!((score(&half, 1.0) - 50.0).abs() < 1e-12);
        let partial = ValidationMetrics {
            excluded: 90,
            ..metrics(0.5, 1.0)
        };
        assert!(score(&partial, 0.5) < score(&full, 0.5));
    }

    #[test]
    fn tin_beats_coarse_idw_on_a_plane() {
        let mut pts = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let (x, y) = (i as f64, j as f64);
                pts.push(SurveyPoint::new(format!("{i}-{j}"), x, y, 2.0 * x + y));
            }
        }
        let tin = TinPredictor::default();
        let idw = IdwPredictor::new(IdwConfig::default().with_search_radius(5.0).with_power(1.0));
        let candidates: [&dyn SurfacePredictor; 2] = [&idw, &tin];
        let cmp = compare_methods(&pts, &candidates, &CrossValidationConfig::k_fold(5)).unwrap();
        assert_eq!(cmp.best_method, tin.name());
        assert_eq!(cmp.rankings.len(), 2);
        assert!(cmp.rankings[0].score >= cmp.rankings[1].score);
        assert!(cmp.rationale.starts_with("TIN (Delaunay) scored"));
        assert!(cmp.rationale.contains("runner-up IDW"));
    }

    #[test]
    fn empty_candidate_list() {
        let cfg = CrossValidationConfig::default();
        assert!(compare_methods(&[], &[], &cfg).is_err());
    }
}
