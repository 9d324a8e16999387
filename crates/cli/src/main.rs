//! FieldZones CLI - management zones from a field boundary and satellite imagery

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fieldzones_cloud::{
    ExportStatus, ImageryService, LocalImagery, RemoteImagery, RemoteOptions, StacCatalog,
};
use fieldzones_core::io::read_geotiff;
use fieldzones_core::{TimeWindow, ZoneRaster, ZONE_NODATA};
use fieldzones_pipeline::{
    zone_layer, ErrorKind, PipelineConfig, PipelineError, PolygonPolicy, RunParams, ZonePipeline,
    MAX_ZONES,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "fieldzones")]
#[command(author, version, about = "Management zones from satellite imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate management zones for a field
    Run(RunArgs),
    /// Show the boundary read from a zipped shapefile
    Inspect {
        /// Zip archive with the field shapefile
        boundary: PathBuf,
    },
    /// Show information about an exported zone raster
    Info {
        /// Zone GeoTIFF
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Scenes from a local JSON manifest of GeoTIFFs
    Local,
    /// STAC search plus a remote processing endpoint
    Remote,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Zip archive with the field shapefile (.shp, .shx, .dbf, .prj)
    boundary: PathBuf,
    /// First acquisition date (YYYY-MM-DD)
    #[arg(long, default_value = "2025-01-01")]
    start: String,
    /// Last acquisition date (YYYY-MM-DD), inclusive
    #[arg(long, default_value = "2025-03-31")]
    end: String,
    /// Number of management zones
    #[arg(short = 'k', long, default_value = "4")]
    zones: usize,
    /// Imagery backend
    #[arg(long, value_enum, default_value = "local")]
    backend: Backend,
    /// Scene manifest (local backend)
    #[arg(long)]
    scenes: Option<PathBuf>,
    /// Directory for exported rasters (local backend; default: next to the manifest)
    #[arg(long)]
    export_root: Option<PathBuf>,
    /// Processing endpoint URL (remote backend)
    #[arg(long)]
    endpoint: Option<String>,
    /// Bearer token for the processing endpoint (or FIELDZONES_TOKEN)
    #[arg(long)]
    token: Option<String>,
    /// STAC catalog: earth-search, pc, or a STAC API URL
    #[arg(long, default_value = "earth-search")]
    catalog: String,
    /// Pipeline configuration overrides (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Z-score features before clustering
    #[arg(long)]
    standardize: bool,
    /// Reject boundaries with more than one polygon
    #[arg(long)]
    require_single: bool,
    /// PDF report output
    #[arg(long, default_value = "management_zones_report.pdf")]
    report: PathBuf,
    /// Write zoned sample points as GeoJSON
    #[arg(long)]
    geojson: Option<PathBuf>,
    /// Write the report summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
    /// Seconds to wait for the export job (local backend always waits, default 60)
    #[arg(long)]
    wait_export: Option<u64>,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.standardize {
        config.standardize = true;
    }
    if args.require_single {
        config.polygon_policy = PolygonPolicy::RequireSingle;
    }
    Ok(config)
}

fn connect(args: &RunArgs) -> Result<Box<dyn ImageryService>> {
    match args.backend {
        Backend::Local => {
            let manifest = args
                .scenes
                .as_ref()
                .context("--scenes <manifest.json> is required with the local backend")?;
            let pb = spinner("Loading scenes...");
            let mut imagery = LocalImagery::from_manifest(manifest)
                .with_context(|| format!("Failed to load scenes from {}", manifest.display()))?;
            pb.finish_and_clear();
            if let Some(root) = &args.export_root {
                imagery = imagery.with_export_root(root.clone());
            }
            info!("Local backend: {} scene(s)", imagery.scenes().len());
            Ok(Box::new(imagery))
        }
        Backend::Remote => {
            let endpoint = args
                .endpoint
                .as_ref()
                .context("--endpoint <url> is required with the remote backend")?;
            let mut options = RemoteOptions::new(endpoint.clone());
            options.token = args.token.clone().or_else(|| std::env::var("FIELDZONES_TOKEN").ok());
            options.catalog = StacCatalog::from_str_or_url(&args.catalog);
            let imagery = RemoteImagery::connect(options).context("Failed to set up the remote backend")?;
            Ok(Box::new(imagery))
        }
    }
}

fn write_json(path: &Path, value: &str) -> Result<()> {
    std::fs::write(path, value).with_context(|| format!("Failed to write {}", path.display()))
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<PipelineError>().map(PipelineError::kind) {
        Some(ErrorKind::Input | ErrorKind::Parameter) => ExitCode::from(2),
        Some(ErrorKind::UpstreamEmpty) => ExitCode::from(3),
        _ => ExitCode::from(1),
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn cmd_run(args: RunArgs) -> Result<()> {
    let window = TimeWindow::parse(&args.start, &args.end).map_err(PipelineError::from)?;
    let params = RunParams {
        window,
        zones: args.zones,
    };
    params.validate()?;

    let config = load_config(&args)?;
    let service = connect(&args)?;
    let pipeline = ZonePipeline::new(service.as_ref(), config)?;

    let start = Instant::now();
    let pb = spinner("Reading boundary...");
    let boundary = pipeline.load_boundary(&args.boundary)?;
    let result = pipeline.run_with_progress(&boundary.region, &params, &mut |stage| {
        pb.set_message(format!("{}...", stage))
    });
    pb.finish_and_clear();
    let mut outcome = result?;
    info!("{} sample(s) in {} zone(s)", outcome.samples.len(), params.zones);

    for line in outcome.report.render_lines() {
        println!("{}", line);
    }
    println!();

    outcome
        .report
        .write_pdf(&args.report)
        .with_context(|| format!("Failed to write report {}", args.report.display()))?;
    println!("Report saved to: {}", args.report.display());

    if let Some(path) = &args.geojson {
        let layer = zone_layer(&outcome.samples, &outcome.assignment);
        write_json(path, &serde_json::to_string(&layer)?)?;
        println!("Zone layer saved to: {}", path.display());
    }
    if let Some(path) = &args.summary_json {
        write_json(path, &outcome.report.to_json()?)?;
        println!("Summary saved to: {}", path.display());
    }

    let job = &mut outcome.export.job;
    println!(
        "Export job {} submitted: {} ({} x {} cells, {} labelled)",
        job.id(),
        job.destination(),
        outcome.export.cols,
        outcome.export.rows,
        outcome.export.labelled_cells
    );

    let wait = match (args.backend, args.wait_export) {
        (_, Some(secs)) => Some(secs),
        (Backend::Local, None) => Some(60),
        (Backend::Remote, None) => None,
    };
    match wait {
        Some(secs) => {
            let pb = spinner("Waiting for export...");
            let status = job.wait(Duration::from_secs(secs), Duration::from_millis(500))?;
            pb.finish_and_clear();
            match status {
                ExportStatus::Completed { location } => println!("Export completed: {}", location),
                ExportStatus::Failed { reason } => anyhow::bail!("Export failed: {}", reason),
                other => println!("Export still {} after {} s", other, secs),
            }
        }
        None => {
            println!("Export status: {}", job.last_status());
            println!(
                "The export runs in the background. Make sure the '{}' folder is shared with your account.",
                pipeline.config().export_folder
            );
        }
    }

    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

fn cmd_inspect(boundary: &Path) -> Result<()> {
    let pb = spinner("Reading boundary...");
    let loaded = fieldzones_pipeline::load_region_from_archive(boundary, PolygonPolicy::First)?;
    pb.finish_and_clear();

    let bbox = loaded.region.bbox();
    let (cx, cy) = loaded.region.centroid();
    println!("File: {}", boundary.display());
    println!("Source CRS: {}", loaded.source_crs);
    println!("Polygons: {}", loaded.polygon_count);
    println!("Vertices: {}", loaded.region.exterior().len().saturating_sub(1));
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
    );
    println!("Centroid: ({:.6}, {:.6})", cx, cy);
    Ok(())
}

fn cmd_info(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...");
    let mut raster: ZoneRaster = read_geotiff(input).context("Failed to read raster")?;
    pb.finish_and_clear();
    if raster.nodata().is_none() {
        raster.set_nodata(Some(ZONE_NODATA));
    }

    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    println!(
        "Labelled cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );

    let mut counts = [0usize; MAX_ZONES];
    for &v in raster.data().iter().filter(|&&v| v != ZONE_NODATA) {
        if let Some(c) = counts.get_mut(v as usize) {
            *c += 1;
        }
    }
    let zones = stats.max.map_or(0, |m| m as usize + 1).min(MAX_ZONES);
    for (zone, count) in counts.iter().take(zones).enumerate() {
        println!("  Zone {}: {} cells", zone + 1, count);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("{:#}", e);
    }

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Inspect { boundary } => cmd_inspect(&boundary),
        Commands::Info { input } => cmd_info(&input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<PipelineError>() {
                Some(e) if e.kind().is_recoverable() => {
                    eprintln!("{}", e.user_message());
                    tracing::debug!("{:#}", err);
                }
                _ => eprintln!("Error: {:#}", err),
            }
            exit_code(&err)
        }
    }
}
