//! Quality validation: cross-validation strategies, error metrics and
//! method comparison.

mod compare;
mod cross;
mod metrics;
mod predictor;

pub use compare::{compare_methods, score, MethodComparison, MethodScore, RMSE_WEIGHT, R_SQUARED_WEIGHT};
pub use cross::{
    cross_validate, CrossValidationConfig, CrossValidationMethod, CrossValidationOverrides,
    CrossValidationResult, DEFAULT_LEAVE_ONE_OUT_POINTS,
};
pub use metrics::{Prediction, ValidationMetrics};
pub use predictor::{IdwPredictor, SurfacePredictor, TinPredictor};
