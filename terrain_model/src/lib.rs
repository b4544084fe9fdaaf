//! Core library of the terrain modeling engine.
//!
//! Survey points flow through ingestion and cleaning into a spatial index,
//! then into a triangulation and/or interpolated grids, are scored by
//! cross-validation and finally assembled into a [`GeneratedSurface`].

pub mod cancel;
pub mod cleaning;
pub mod dataset;
pub mod dtm;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod interpolation;
pub mod io;
pub mod points;
pub mod spatial_index;
pub mod surface;
pub mod validation;

pub use cancel::CancelToken;
pub use dataset::{BoundingBox, DatasetStatistics, PointDataset};
pub use error::{Result, TerrainError};
pub use points::{Classification, PointSource, SurveyPoint};
pub use surface::{GeneratedSurface, SurfaceConfig, SurfaceMethod};
