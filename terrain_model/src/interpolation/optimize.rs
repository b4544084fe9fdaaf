//! Leave-one-out selection of the IDW power.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::idw::{estimate, index_for, IdwConfig, PowerMode};
use crate::error::{Result, TerrainError};
use crate::points::SurveyPoint;

pub const DEFAULT_POWER_CANDIDATES: [f64; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

/// Only the first this many points are held out.
pub const MAX_HELD_OUT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerOptimization {
    pub best_power: f64,
    pub best_rmse: f64,
    /// `(power, rmse)` for every candidate, in candidate order. A power that
    /// predicted no held-out point has an infinite RMSE.
    pub errors: Vec<(f64, f64)>,
    pub held_out: usize,
}

/// Picks the candidate power with the lowest leave-one-out RMSE.
///
/// Each of the first [`MAX_HELD_OUT`] points is predicted from all the other
/// points with the remaining settings of `config`. Ties go to the earlier
/// candidate.
pub fn optimize_idw_power(
    points: &[SurveyPoint],
    config: &IdwConfig,
    candidates: &[f64],
) -> Result<PowerOptimization> {
    config.validate()?;
    if candidates.is_empty() {
        return Err(TerrainError::InvalidConfig("no candidate powers".into()));
    }
    if let Some(bad) = candidates.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
        return Err(TerrainError::InvalidConfig(format!(
            "candidate power must be positive, got {}",
            bad
        )));
    }
    if points.len() < 2 {
        return Err(TerrainError::InvalidConfig(format!(
            "power optimization needs at least two points, got {}",
            points.len()
        )));
    }

    let index = index_for(points, config)?;
    let held_out = points.len().min(MAX_HELD_OUT);
    // one neighbor query per held-out point, shared by every candidate
    let per_point: Vec<Vec<Option<f64>>> = (0..held_out)
        .into_par_iter()
        .map(|i| {
            let p = &points[i];
            let neighbors: Vec<(f64, f64)> = index
                .query_radius(p.x, p.y, config.search_radius, config.max_neighbors + 1)
                .into_iter()
                .filter(|n| n.index != i)
                .take(config.max_neighbors)
                .map(|n| (n.distance, points[n.index].z))
                .collect();
            candidates
                .iter()
                .map(|&power| {
                    let c = config.clone().with_power(power);
                    estimate(&neighbors, &c, PowerMode::Fixed).map(|z| (z - p.z).powi(2))
                })
                .collect()
        })
        .collect();

    let errors: Vec<(f64, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(k, &power)| {
            let (sum, n) = per_point
                .iter()
                .filter_map(|row| row[k])
                .fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
            let rmse = if n == 0 { f64::INFINITY } else { (sum / n as f64).sqrt() };
            (power, rmse)
        })
        .collect();

    let (best_power, best_rmse) = errors
        .iter()
        .copied()
        .fold(errors[0], |best, e| if e.1 < best.1 { e } else { best });
    log::info!(
        "IDW power optimization over {} held-out points: power {} (RMSE {:.4})",
        held_out,
        best_power,
        best_rmse
    );
    Ok(PowerOptimization {
        best_power,
        best_rmse,
        errors,
        held_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Vec<SurveyPoint> {
        let mut pts = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                let (x, y) = (i as f64 * 5.0, j as f64 * 5.0);
                pts.push(SurveyPoint::new(format!("{i}-{j}"), x, y, 100.0 + 0.2 * x + 0.05 * y));
            }
        }
        pts
    }

    #[test]
    fn best_power_has_minimum_rmse() {
        let config = IdwConfig::default().with_search_radius(20.0);
        let result = optimize_idw_power(&ramp(), &config, &DEFAULT_POWER_CANDIDATES).unwrap();
        assert!(DEFAULT_POWER_CANDIDATES.contains(&result.best_power));
        assert_eq!(result.errors.len(), 5);
        assert_eq!(result.held_out, 100);
        assert!(result.errors.iter().all(|&(_, rmse)| result.best_rmse <= rmse));
    }

    #[test]
    fn unreachable_neighbors_give_infinite_rmse() {
        let pts = vec![
            SurveyPoint::new("a", 0.0, 0.0, 1.0),
            SurveyPoint::new("b", 1000.0, 0.0, 2.0),
        ];
        let config = IdwConfig::default().with_search_radius(10.0).with_neighbors(1, 4);
        let result = optimize_idw_power(&pts, &config, &[1.0, 2.0]).unwrap();
        assert!(result.best_rmse.is_infinite());
        assert_eq!(result.best_power, 1.0);
    }

    #[test]
    fn rejects_empty_candidates() {
        assert!(optimize_idw_power(&ramp(), &IdwConfig::default(), &[]).is_err());
        assert!(optimize_idw_power(&ramp(), &IdwConfig::default(), &[0.0]).is_err());
    }
}
