use serde::{Deserialize, Serialize};

/// Error statistics of predictions against held-out values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub rmse: f64,
    pub mae: f64,
    /// Largest absolute error.
    pub max_error: f64,
    /// Coefficient of determination against the mean of the actual values.
    pub r_squared: f64,
    /// Mean signed error; positive when the method overestimates.
    pub bias: f64,
    /// Pairs that contributed.
    pub count: usize,
    /// Held-out points without a prediction.
    pub excluded: usize,
}

/// One held-out comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub actual: f64,
    pub predicted: Option<f64>,
}

impl ValidationMetrics {
    /// Reduces predictions; entries without a prediction only count towards
    /// `excluded`. With nothing to compare every statistic is zero.
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        let pairs: Vec<(f64, f64)> = predictions
            .iter()
            .filter_map(|p| p.predicted.map(|z| (z, p.actual)))
            .collect();
        let excluded = predictions.len() - pairs.len();
        Self::from_pairs(&pairs, excluded)
    }

    /// Metrics from `(predicted, actual)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)], excluded: usize) -> Self {
        if pairs.is_empty() {
            return Self {
                excluded,
                ..Default::default()
            };
        }
        let n = pairs.len() as f64;
        let mut sq = 0.0;
        let mut abs = 0.0;
        let mut max_error: f64 = 0.0;
        let mut signed = 0.0;
        for &(predicted, actual) in pairs {
            let e = predicted - actual;
            sq += e * e;
            abs += e.abs();
            max_error = max_error.max(e.abs());
            signed += e;
        }
        let mean_actual = pairs.iter().map(|&(_, a)| a).sum::<f64>() / n;
        let ss_tot: f64 = pairs.iter().map(|&(_, a)| (a - mean_actual).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 {
            1.0 - sq / ss_tot
        } else if sq == 0.0 {
            1.0
        } else {
            0.0
        };
        Self {
            rmse: (sq / n).sqrt(),
            mae: abs / n,
            max_error,
            r_squared,
            bias: signed / n,
            count: pairs.len(),
            excluded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let m = ValidationMetrics::from_pairs(&[(1.0, 1.0), (2.0, 2.0), (4.0, 4.0)], 0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r_squared, 1.0);
        assert_eq!(m.count, 3);
    }

    #[test]
    fn known_errors() {
        // errors +1, -1, +2, 0
        let pairs = [(2.0, 1.0), (1.0, 2.0), (5.0, 3.0), (4.0, 4.0)];
        let m = ValidationMetrics::from_pairs(&pairs, 2);
        assert!((m.rmse - (6.0f64 / 4.0).sqrt()).abs() < 1e-12);
        assert!((m.mae - 1.0).abs() < 1e-12);
        assert_eq!(m.max_error, 2.0);
        assert!((m.bias - 0.5).abs() < 1e-12);
        // actual mean 2.5, ss_tot = 2.25 + 0.25 + 0.25 + 2.25
        assert!((m.r_squared - (1.0 - 6.0 / 5.0)).abs() < 1e-12);
        assert_eq!(m.excluded, 2);
    }

    #[test]
    fn missing_predictions_are_excluded() {
        let preds = vec![
            Prediction {
                id: "a".into(),
                actual: 1.0,
                predicted: Some(1.5),
            },
            Prediction {
                id: "b".into(),
                actual: 2.0,
                predicted: None,
            },
        ];
        let m = ValidationMetrics::from_predictions(&preds);
        assert_eq!(m.count, 1);
        assert_eq!(m.excluded, 1);
        assert_eq!(m.bias, 0.5);
    }

    #[test]
    fn empty_is_zeroed() {
        let m = ValidationMetrics::from_pairs(&[], 3);
        assert_eq!(m.count, 0);
        assert_eq!(m.excluded, 3);
        assert_eq!(m.rmse, 0.0);
    }
}
