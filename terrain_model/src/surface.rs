//! Assembly of versioned surface artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::dataset::PointDataset;
use crate::dtm::{triangulate, Breakline, ConstraintRegion, Triangulation, TriangulationConfig};
use crate::error::{Result, TerrainError};
use crate::interpolation::{
    interpolate_adaptive_idw_grid, interpolate_idw_grid, ElevationGrid, GridConfig, IdwConfig,
};
use crate::points::PointSource;
use crate::validation::{
    cross_validate, CrossValidationConfig, IdwPredictor, SurfacePredictor, TinPredictor,
    ValidationMetrics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMethod {
    Delaunay,
    ConstrainedDelaunay,
    Idw,
    Kriging,
    NaturalNeighbor,
}

impl SurfaceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delaunay => "delaunay",
            Self::ConstrainedDelaunay => "constrained_delaunay",
            Self::Idw => "idw",
            Self::Kriging => "kriging",
            Self::NaturalNeighbor => "natural_neighbor",
        }
    }
}

/// Everything needed to regenerate a surface from its dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub method: SurfaceMethod,
    pub triangulation: TriangulationConfig,
    pub idw: IdwConfig,
    /// Adapt the IDW power to local density.
    pub adaptive_idw: bool,
    /// Raster to produce; TIN methods rasterise the mesh onto it.
    pub grid: Option<GridConfig>,
    /// Cross-validate the method and attach the metrics.
    pub validation: Option<CrossValidationConfig>,
    pub breaklines: Vec<Breakline>,
    pub regions: Vec<ConstraintRegion>,
}

impl SurfaceConfig {
    pub fn new(method: SurfaceMethod) -> Self {
        Self {
            method,
            triangulation: TriangulationConfig::default(),
            idw: IdwConfig::default(),
            adaptive_idw: false,
            grid: None,
            validation: None,
            breaklines: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_idw(mut self, idw: IdwConfig) -> Self {
        self.idw = idw;
        self
    }

    pub fn with_validation(mut self, validation: CrossValidationConfig) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_breaklines(mut self, breaklines: Vec<Breakline>) -> Self {
        self.breaklines = breaklines;
        self
    }

    pub fn with_regions(mut self, regions: Vec<ConstraintRegion>) -> Self {
        self.regions = regions;
        self
    }
}

/// An immutable terrain model. Changing the configuration produces a new
/// surface with a new id and a link to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSurface {
    pub id: Uuid,
    pub dataset_id: String,
    pub method: SurfaceMethod,
    pub config: SurfaceConfig,
    pub triangulation: Option<Triangulation>,
    pub grid: Option<ElevationGrid>,
    pub metrics: Option<ValidationMetrics>,
    pub point_count: usize,
    /// Points in the dataset that came from DEM fusion.
    pub dem_samples: usize,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub version: u32,
    pub parent: Option<Uuid>,
}

impl GeneratedSurface {
    /// Builds a surface from `dataset` with `config`.
    ///
    /// Kriging and natural-neighbor rasters come from external engines; wrap
    /// them with [`GeneratedSurface::from_grid`].
    pub fn generate(
        dataset: &PointDataset,
        config: SurfaceConfig,
        cancel: Option<&CancelToken>,
    ) -> Result<Self> {
        Self::build(dataset, config, cancel, 1, None)
    }

    /// Wraps a raster computed elsewhere.
    pub fn from_grid(
        dataset: &PointDataset,
        method: SurfaceMethod,
        grid: ElevationGrid,
        metrics: Option<ValidationMetrics>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id: dataset.id().to_string(),
            method,
            config: SurfaceConfig::new(method),
            triangulation: None,
            grid: Some(grid),
            metrics,
            point_count: dataset.len(),
            dem_samples: dataset.count_by_source(PointSource::DemSample),
            warnings: Vec::new(),
            created_at: Utc::now(),
            version: 1,
            parent: None,
        }
    }

    /// Regenerates from the same dataset with a new configuration.
    pub fn reconfigure(
        &self,
        dataset: &PointDataset,
        config: SurfaceConfig,
        cancel: Option<&CancelToken>,
    ) -> Result<Self> {
        if dataset.id() != self.dataset_id {
            return Err(TerrainError::InvalidConfig(format!(
                "surface {} was built from dataset {}, not {}",
                self.id,
                self.dataset_id,
                dataset.id()
            )));
        }
        Self::build(dataset, config, cancel, self.version + 1, Some(self.id))
    }

    fn build(
        dataset: &PointDataset,
        config: SurfaceConfig,
        cancel: Option<&CancelToken>,
        version: u32,
        parent: Option<Uuid>,
    ) -> Result<Self> {
        let points = dataset.points();
        let mut warnings = Vec::new();
        let (method, triangulation, grid) = match config.method {
            SurfaceMethod::Delaunay | SurfaceMethod::ConstrainedDelaunay => {
                let breaklines: &[Breakline] = if config.method == SurfaceMethod::Delaunay {
                    &[]
                } else {
                    &config.breaklines
                };
                let tin = triangulate(points, breaklines, &config.regions, &config.triangulation)?;
                warnings.extend(tin.warnings().iter().cloned());
                if tin.is_empty() {
                    warnings.push("triangulation is empty (fewer than three usable points)".into());
                }
                let grid = match &config.grid {
                    Some(g) => Some(tin.to_grid(g, cancel)?),
                    None => None,
                };
                let method = if tin.is_constrained() {
                    SurfaceMethod::ConstrainedDelaunay
                } else {
                    SurfaceMethod::Delaunay
                };
                (method, Some(tin), grid)
            }
            SurfaceMethod::Idw => {
                let grid_config = config.grid.as_ref().ok_or_else(|| {
                    TerrainError::InvalidConfig("IDW surfaces need a grid configuration".into())
                })?;
                let grid = if config.adaptive_idw {
                    interpolate_adaptive_idw_grid(points, grid_config, &config.idw, cancel)?
                } else {
                    interpolate_idw_grid(points, grid_config, &config.idw, cancel)?
                };
                if grid.statistics.valid_cells == 0 {
                    warnings.push("no grid cell has enough neighbors within the search radius".into());
                }
                (SurfaceMethod::Idw, None, Some(grid))
            }
            SurfaceMethod::Kriging | SurfaceMethod::NaturalNeighbor => {
                return Err(TerrainError::InvalidConfig(format!(
                    "{} surfaces are computed externally; use GeneratedSurface::from_grid",
                    config.method.as_str()
                )));
            }
        };

        let metrics = match &config.validation {
            Some(cv) => {
                let predictor: Box<dyn SurfacePredictor> = match method {
                    SurfaceMethod::Idw if config.adaptive_idw => {
                        Box::new(IdwPredictor::adaptive(config.idw.clone()))
                    }
                    SurfaceMethod::Idw => Box::new(IdwPredictor::new(config.idw.clone())),
                    _ => Box::new(TinPredictor {
                        config: config.triangulation.clone(),
                    }),
                };
                Some(cross_validate(points, predictor.as_ref(), cv)?.metrics)
            }
            None => None,
        };

        let surface = Self {
            id: Uuid::new_v4(),
            dataset_id: dataset.id().to_string(),
            method,
            config,
            triangulation,
            grid,
            metrics,
            point_count: points.len(),
            dem_samples: dataset.count_by_source(PointSource::DemSample),
            warnings,
            created_at: Utc::now(),
            version,
            parent,
        };
        log::info!(
            "generated {} surface {} v{} from dataset {}",
            surface.method.as_str(),
            surface.id,
            surface.version,
            surface.dataset_id
        );
        Ok(surface)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
