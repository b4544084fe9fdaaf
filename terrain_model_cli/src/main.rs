use std::path::Path;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use terrain_model::{
    cleaning::{CleaningConfig, CleaningOverrides},
    dataset::BoundingBox,
    dtm::{triangulate, Breakline, ConstraintRegion, TriangulationConfig},
    ingest::{ParseOptions, ParseReport},
    interpolation::{
        optimize_idw_power, GridConfig, GridOverrides, IdwConfig, IdwOverrides,
        DEFAULT_POWER_CANDIDATES,
    },
    io::{
        read_breaklines_csv, read_points, read_regions_json, write_contours_csv,
        write_points_csv, write_surface_json,
    },
    validation::{
        compare_methods, cross_validate, CrossValidationConfig, CrossValidationMethod,
        CrossValidationOverrides, IdwPredictor, SurfacePredictor, TinPredictor,
        ValidationMetrics,
    },
    GeneratedSurface, PointDataset, SurfaceConfig, SurfaceMethod,
};

/// Overrides loaded from `--config`; every section and field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    cleaning: CleaningOverrides,
    idw: IdwOverrides,
    grid: GridOverrides,
    validation: CrossValidationOverrides,
}

impl ConfigFile {
    fn load(path: Option<&str>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = terrain_model::io::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {}", path, e))?;
        serde_json::from_str(&contents).map_err(|e| format!("Error parsing {}: {}", path, e))
    }
}

/// Command line front-end of the terrain modeling engine.
#[derive(Parser)]
#[command(name = "terrain_model_cli", version)]
struct Cli {
    /// JSON file with cleaning, idw, grid and validation overrides
    #[arg(long, global = true)]
    config: Option<String>,
    /// Field delimiter; detected when omitted
    #[arg(long, global = true)]
    delimiter: Option<char>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Delaunay,
    ConstrainedDelaunay,
    Idw,
    AdaptiveIdw,
}

#[derive(Clone, Copy, ValueEnum)]
enum ValidationArg {
    Loo,
    KFold,
    RandomSplit,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the schema of a point file and print dataset statistics.
    Inspect { input: String },
    /// Remove duplicates and elevation outliers, writing a cleaned CSV.
    Clean { input: String, output: String },
    /// Triangulate a point file, optionally with breaklines and regions.
    Tin {
        input: String,
        /// CSV of line_id,kind,x,y[,z] rows
        #[arg(long)]
        breaklines: Option<String>,
        /// JSON array of constraint regions
        #[arg(long)]
        regions: Option<String>,
        /// Write contours to this CSV
        #[arg(long)]
        contours: Option<String>,
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
        /// Write the surface JSON here
        #[arg(long)]
        output: Option<String>,
    },
    /// Interpolate an IDW grid and write it as surface JSON.
    Grid {
        input: String,
        output: String,
        #[arg(long)]
        resolution: Option<f64>,
        #[arg(long)]
        power: Option<f64>,
        #[arg(long)]
        radius: Option<f64>,
        #[arg(long)]
        adaptive: bool,
    },
    /// Choose the IDW power with the lowest leave-one-out RMSE.
    OptimizePower {
        input: String,
        /// Comma separated powers to try
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<f64>,
    },
    /// Cross-validate a method, or rank TIN against IDW with --compare.
    Validate {
        input: String,
        #[arg(long, value_enum)]
        method: Option<ValidationArg>,
        #[arg(long, value_enum, default_value = "idw")]
        surface: MethodArg,
        #[arg(long)]
        compare: bool,
    },
    /// Build a complete surface artifact.
    Surface {
        input: String,
        output: String,
        #[arg(long, value_enum, default_value = "delaunay")]
        method: MethodArg,
        #[arg(long)]
        breaklines: Option<String>,
        #[arg(long)]
        regions: Option<String>,
        #[arg(long)]
        resolution: Option<f64>,
        /// Attach cross-validation metrics
        #[arg(long)]
        validate: bool,
    },
}

struct Context {
    config: ConfigFile,
    parse: ParseOptions,
}

impl Context {
    fn parse_file(&self, input: &str) -> Result<ParseReport, String> {
        let report =
            read_points(input, &self.parse).map_err(|e| format!("Error reading {}: {}", input, e))?;
        for issue in report.errors.iter().chain(&report.warnings) {
            log::warn!("{} line {}: {}", input, issue.line, issue.message);
        }
        Ok(report)
    }

    /// Parses and cleans `input`; the file stem becomes the dataset id.
    fn load(&self, input: &str) -> Result<PointDataset, String> {
        let report = self.parse_file(input)?;
        let id = Path::new(input)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(input)
            .to_string();
        let cleaning = CleaningConfig::default().apply_overrides(&self.config.cleaning);
        let (dataset, cleaned) = PointDataset::new(id, report.points).clean(&cleaning);
        for w in &cleaned.warnings {
            log::info!("{}", w);
        }
        Ok(dataset)
    }

    fn idw(&self) -> IdwConfig {
        IdwConfig::default().apply_overrides(&self.config.idw)
    }

    fn validation(&self) -> CrossValidationConfig {
        CrossValidationConfig::default().apply_overrides(&self.config.validation)
    }

    fn grid(&self, dataset: &PointDataset, resolution: Option<f64>) -> Result<GridConfig, String> {
        let bounds: BoundingBox = dataset
            .bounds()
            .ok_or_else(|| "Dataset has no points".to_string())?;
        let default_resolution = (bounds.width().max(bounds.height()) / 100.0).max(f64::EPSILON);
        let mut grid = GridConfig::covering(bounds, default_resolution)
            .apply_overrides(&self.config.grid);
        if let Some(r) = resolution {
            grid.resolution = r;
        }
        Ok(grid)
    }
}

fn read_constraints(
    breaklines: Option<&str>,
    regions: Option<&str>,
) -> Result<(Vec<Breakline>, Vec<ConstraintRegion>), String> {
    let lines = match breaklines {
        Some(path) => read_breaklines_csv(path).map_err(|e| format!("Error reading {}: {}", path, e))?,
        None => Vec::new(),
    };
    let regions = match regions {
        Some(path) => read_regions_json(path).map_err(|e| format!("Error reading {}: {}", path, e))?,
        None => Vec::new(),
    };
    Ok((lines, regions))
}

fn print_metrics(label: &str, m: &ValidationMetrics) {
    println!(
        "{}: RMSE {:.4}, MAE {:.4}, max error {:.4}, R² {:.4}, bias {:+.4} ({} points, {} excluded)",
        label, m.rmse, m.mae, m.max_error, m.r_squared, m.bias, m.count, m.excluded
    );
}

fn write_surface(output: &str, surface: &GeneratedSurface) -> Result<(), String> {
    write_surface_json(output, surface).map_err(|e| format!("Error writing {}: {}", output, e))?;
    println!("Wrote {}", output);
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let ctx = Context {
        config: ConfigFile::load(cli.config.as_deref())?,
        parse: ParseOptions {
            delimiter: cli.delimiter,
            ..Default::default()
        },
    };

    match cli.command {
        Commands::Inspect { input } => {
            let report = ctx.parse_file(&input)?;
            println!("Delimiter: {:?}", report.delimiter);
            println!("Header: {}", report.has_header);
            let m = &report.mapping;
            println!("Columns: x={} y={} z={} id={:?}", m.x, m.y, m.z, m.id);
            println!(
                "Rows: {} ({} points, {} errors, {} warnings)",
                report.rows,
                report.points.len(),
                report.errors.len(),
                report.warnings.len()
            );
            let dataset = PointDataset::new(input.clone(), report.points);
            let s = dataset.statistics();
            println!(
                "Elevation: min {:.3}, max {:.3}, mean {:.3}, std dev {:.3}",
                s.elevation_min, s.elevation_max, s.elevation_mean, s.elevation_std_dev
            );
            println!("Density: {:.4} points per unit area", s.density);
        }
        Commands::Clean { input, output } => {
            let dataset = ctx.load(&input)?;
            let s = dataset.statistics();
            println!(
                "Removed {} duplicates and {} outliers; {} points remain",
                s.duplicates_removed,
                s.outliers_removed,
                dataset.len()
            );
            write_points_csv(&output, dataset.points())
                .map_err(|e| format!("Error writing {}: {}", output, e))?;
            println!("Wrote {}", output);
        }
        Commands::Tin {
            input,
            breaklines,
            regions,
            contours,
            interval,
            output,
        } => {
            let dataset = ctx.load(&input)?;
            let (lines, regions) = read_constraints(breaklines.as_deref(), regions.as_deref())?;
            let tin = triangulate(dataset.points(), &lines, &regions, &TriangulationConfig::default())
                .map_err(|e| format!("Error triangulating {}: {}", input, e))?;
            println!(
                "Triangles: {} ({} hull edges)",
                tin.triangles().len(),
                tin.hull_edges().count()
            );
            for w in tin.warnings() {
                println!("Warning: {}", w);
            }
            if let Some(path) = contours {
                let lines = tin.contours(interval);
                write_contours_csv(&path, &lines)
                    .map_err(|e| format!("Error writing {}: {}", path, e))?;
                println!("Wrote {} contours to {}", lines.len(), path);
            }
            if let Some(path) = output {
                let config = SurfaceConfig::new(SurfaceMethod::ConstrainedDelaunay)
                    .with_breaklines(lines)
                    .with_regions(regions);
                let surface = GeneratedSurface::generate(&dataset, config, None)
                    .map_err(|e| format!("Error building surface: {}", e))?;
                write_surface(&path, &surface)?;
            }
        }
        Commands::Grid {
            input,
            output,
            resolution,
            power,
            radius,
            adaptive,
        } => {
            let dataset = ctx.load(&input)?;
            let mut idw = ctx.idw();
            if let Some(p) = power {
                idw = idw.with_power(p);
            }
            if let Some(r) = radius {
                idw = idw.with_search_radius(r);
            }
            let mut config = SurfaceConfig::new(SurfaceMethod::Idw)
                .with_idw(idw)
                .with_grid(ctx.grid(&dataset, resolution)?);
            config.adaptive_idw = adaptive;
            let surface = GeneratedSurface::generate(&dataset, config, None)
                .map_err(|e| format!("Error interpolating {}: {}", input, e))?;
            if let Some(grid) = &surface.grid {
                println!(
                    "Grid {}x{}: {} cells with data, {} without",
                    grid.width, grid.height, grid.statistics.valid_cells, grid.statistics.invalid_cells
                );
            }
            write_surface(&output, &surface)?;
        }
        Commands::OptimizePower { input, candidates } => {
            let dataset = ctx.load(&input)?;
            let candidates = if candidates.is_empty() {
                DEFAULT_POWER_CANDIDATES.to_vec()
            } else {
                candidates
            };
            let result = optimize_idw_power(dataset.points(), &ctx.idw(), &candidates)
                .map_err(|e| format!("Error optimizing {}: {}", input, e))?;
            for (power, rmse) in &result.errors {
                println!("Power {}: RMSE {:.4}", power, rmse);
            }
            println!("Best power: {} (RMSE {:.4})", result.best_power, result.best_rmse);
        }
        Commands::Validate {
            input,
            method,
            surface,
            compare,
        } => {
            let dataset = ctx.load(&input)?;
            let mut cv = ctx.validation();
            if let Some(m) = method {
                cv.method = match m {
                    ValidationArg::Loo => CrossValidationMethod::LeaveOneOut,
                    ValidationArg::KFold => CrossValidationMethod::KFold,
                    ValidationArg::RandomSplit => CrossValidationMethod::RandomSplit,
                };
            }
            let idw = IdwPredictor::new(ctx.idw());
            let adaptive = IdwPredictor::adaptive(ctx.idw());
            let tin = TinPredictor::default();
            if compare {
                let candidates: [&dyn SurfacePredictor; 3] = [&tin, &idw, &adaptive];
                let result = compare_methods(dataset.points(), &candidates, &cv)
                    .map_err(|e| format!("Error validating {}: {}", input, e))?;
                for (rank, m) in result.rankings.iter().enumerate() {
                    println!("{}. {} scored {:.1}", rank + 1, m.name, m.score);
                }
                println!("Best method: {}", result.best_method);
                println!("{}", result.rationale);
            } else {
                let predictor: &dyn SurfacePredictor = match surface {
                    MethodArg::Delaunay | MethodArg::ConstrainedDelaunay => &tin,
                    MethodArg::Idw => &idw,
                    MethodArg::AdaptiveIdw => &adaptive,
                };
                let result = cross_validate(dataset.points(), predictor, &cv)
                    .map_err(|e| format!("Error validating {}: {}", input, e))?;
                print_metrics(&result.predictor, &result.metrics);
                for (i, fold) in result.folds.iter().enumerate() {
                    print_metrics(&format!("  fold {}", i + 1), fold);
                }
            }
        }
        Commands::Surface {
            input,
            output,
            method,
            breaklines,
            regions,
            resolution,
            validate,
        } => {
            let dataset = ctx.load(&input)?;
            let (lines, regions) = read_constraints(breaklines.as_deref(), regions.as_deref())?;
            let (surface_method, adaptive) = match method {
                MethodArg::Delaunay => (SurfaceMethod::Delaunay, false),
                MethodArg::ConstrainedDelaunay => (SurfaceMethod::ConstrainedDelaunay, false),
                MethodArg::Idw => (SurfaceMethod::Idw, false),
                MethodArg::AdaptiveIdw => (SurfaceMethod::Idw, true),
            };
            let mut config = SurfaceConfig::new(surface_method)
                .with_idw(ctx.idw())
                .with_breaklines(lines)
                .with_regions(regions);
            config.adaptive_idw = adaptive;
            if resolution.is_some() || surface_method == SurfaceMethod::Idw {
                config = config.with_grid(ctx.grid(&dataset, resolution)?);
            }
            if validate {
                config = config.with_validation(ctx.validation());
            }
            let surface = GeneratedSurface::generate(&dataset, config, None)
                .map_err(|e| format!("Error building surface: {}", e))?;
            println!(
                "Surface {} ({}, version {})",
                surface.id,
                surface.method.as_str(),
                surface.version
            );
            for w in &surface.warnings {
                println!("Warning: {}", w);
            }
            if let Some(m) = &surface.metrics {
                print_metrics("Validation", m);
            }
            write_surface(&output, &surface)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
