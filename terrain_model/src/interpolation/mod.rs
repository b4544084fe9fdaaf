//! Interpolation engine: IDW point estimates, rasters and power tuning.

mod grid;
mod idw;
mod optimize;

pub use grid::{
    rasterize, ElevationGrid, GridConfig, GridOverrides, GridStatistics, StreamingStats,
    DEFAULT_NO_DATA, MAX_GRID_CELLS, ROW_BATCH,
};
pub use idw::{
    adaptive_power, interpolate_adaptive_idw, interpolate_adaptive_idw_grid, interpolate_idw,
    interpolate_idw_grid, IdwConfig, IdwOverrides, EXACT_MATCH_EPSILON, MAX_ADAPTIVE_POWER,
    MIN_ADAPTIVE_POWER,
};
pub(crate) use idw::{estimate_indexed, index_for, PowerMode};
pub use optimize::{optimize_idw_power, PowerOptimization, DEFAULT_POWER_CANDIDATES, MAX_HELD_OUT};
