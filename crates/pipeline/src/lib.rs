//! # FieldZones Pipeline
//!
//! Management zones from a field boundary and satellite imagery:
//!
//! 1. [`geometry`]: load the boundary from a zipped shapefile
//! 2. [`sampler`]: composite NDVI, NDRE, SBI and altitude over a time window
//!    and sample pixels inside the field
//! 3. [`classifier`]: k-means the samples into zones
//! 4. [`export`]: rasterize zone labels and submit an export job
//! 5. [`report`]: feature means and a one-page PDF
//!
//! [`ZonePipeline`] runs steps 2 to 5 against any
//! [`ImageryService`](fieldzones_cloud::ImageryService).

pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod map;
pub mod report;
pub mod run;
pub mod sampler;

pub use classifier::ZoneClassifier;
pub use config::{PipelineConfig, RunParams, MAX_ZONES, MIN_ZONES};
pub use error::{ErrorKind, PipelineError, Result};
pub use export::{rasterize, ExportOutcome, ZoneExporter};
pub use geometry::{load_region_from_archive, load_region_from_shapefile, LoadedBoundary, PolygonPolicy};
pub use map::zone_layer;
pub use report::ReportSummary;
pub use run::{RunGuard, RunOutcome, RunPermit, Stage, ZonePipeline};
pub use sampler::FeatureSampler;
