//! # FieldZones Cloud
//!
//! Imagery service backends for the zoning pipeline.
//!
//! The pipeline only sees the [`ImageryService`] trait: build a median
//! composite of vegetation and soil indices over a region and time window,
//! sample it, and submit a zone raster for export.
//!
//! ## Backends
//!
//! - [`LocalImagery`]: in-process composites from co-registered scene
//!   GeoTIFFs (always available).
//! - `RemoteImagery`: STAC scene search plus a JSON processing endpoint
//!   (feature `remote`, default on).

pub mod auth;
pub mod error;
pub mod export;
pub mod local;
pub mod process_models;
pub mod service;
pub mod stac_models;

#[cfg(feature = "remote")]
pub mod remote;
#[cfg(feature = "remote")]
mod retry;
#[cfg(feature = "remote")]
pub mod stac_client;

pub use error::{CloudError, Result};
pub use export::{ExportJob, ExportStatus, JobSource};
pub use local::{LocalImagery, Scene, SceneBands};
pub use service::{CompositeHandle, CompositeRequest, ExportRequest, ImageryService, Reducer, SampleRequest};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};

#[cfg(feature = "remote")]
pub use remote::{ProcessingClient, ProcessingClientOptions, RemoteImagery, RemoteOptions};
#[cfg(feature = "remote")]
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
