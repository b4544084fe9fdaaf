//! Error types for the terrain engine.

use thiserror::Error;

/// Terminal failures of a terrain computation.
///
/// Recoverable conditions (rejected rows, duplicates, interpolation gaps,
/// relaxed breaklines) are reported as values on the respective result types
/// and never surface here.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// x, y or z could not be located among the input columns.
    #[error("cannot map x/y/z columns (attempted {attempted})")]
    ColumnMapping { attempted: String },

    /// Parsing finished without a single usable point.
    #[error("no valid points in {rows} data rows ({errors} row errors)")]
    NoValidPoints { rows: usize, errors: usize },

    /// Input recognised as a format this engine does not decode.
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A long-running computation observed its cancellation signal.
    #[error("computation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TerrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = TerrainError::ColumnMapping {
            attempted: "x=None y=Some(1) z=None".into(),
        };
        assert!(format!("{err}").contains("y=Some(1)"));

        let err = TerrainError::NoValidPoints { rows: 4, errors: 4 };
        assert_eq!(
            format!("{err}"),
            "no valid points in 4 data rows (4 row errors)"
        );
    }
}
