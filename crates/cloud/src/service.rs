//! The imagery service contract.
//!
//! The pipeline talks to satellite imagery only through [`ImageryService`]:
//! build a median composite for a region and time window, sample it at
//! points inside the region, and submit a zone raster for export.

use crate::error::Result;
use crate::export::ExportJob;
use fieldzones_core::{BBox, Feature, Region, SamplePoint, TimeWindow, ZoneRaster};

/// Temporal reducer applied per pixel across the scene stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Median,
}

impl Reducer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Median => "median",
        }
    }
}

/// Request for a composite image over a region and window.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    pub region: &'a Region,
    /// Inclusive acquisition-date window
    pub window: TimeWindow,
    /// Collection identifier, e.g. `sentinel-2-l2a`
    pub collection: String,
    /// Bands of the composite, in output order
    pub features: Vec<Feature>,
    pub reducer: Reducer,
    /// Append the static elevation band (`ALT`)
    pub include_elevation: bool,
}

/// Reference to a composite built by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeHandle {
    pub id: String,
    /// Number of scenes that went into the composite; 0 means no imagery.
    pub scene_count: usize,
    pub bands: Vec<Feature>,
}

impl CompositeHandle {
    /// Handle for a window/region with no scenes.
    pub fn empty(bands: Vec<Feature>) -> Self {
        Self {
            id: String::new(),
            scene_count: 0,
            bands,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scene_count == 0
    }
}

/// Request for point samples of a composite.
#[derive(Debug, Clone)]
pub struct SampleRequest<'a> {
    pub region: &'a Region,
    /// Nominal sampling resolution in metres
    pub scale_m: f64,
    /// Upper bound on returned samples
    pub num_pixels: usize,
    pub seed: u64,
    /// Skip pixels where any band is null
    pub drop_nulls: bool,
}

/// Request to export a zone raster to a named destination.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub raster: ZoneRaster,
    /// Destination folder name
    pub folder: String,
    /// Task description, also used as the file stem
    pub description: String,
    pub scale_m: f64,
    /// Largest raster (in cells) the destination accepts
    pub max_pixels: u64,
    pub region_bbox: BBox,
}

/// A satellite imagery service able to composite, sample and export.
///
/// Implementations are shared by reference across the pipeline and must be
/// usable from several threads.
pub trait ImageryService: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Build a reduced composite over the region and window.
    fn composite(&self, request: &CompositeRequest<'_>) -> Result<CompositeHandle>;

    /// Sample composite pixels inside the region.
    ///
    /// Returns at most `num_pixels` points, each with one value per band of
    /// the composite in band order.
    fn sample(&self, composite: &CompositeHandle, request: &SampleRequest<'_>) -> Result<Vec<SamplePoint>>;

    /// Drop whatever the service holds for `composite`. The handle is not
    /// usable afterwards.
    fn release(&self, _composite: &CompositeHandle) {}

    /// Submit an export and return immediately with a job handle.
    fn submit_export(&self, request: ExportRequest) -> Result<ExportJob>;
}
