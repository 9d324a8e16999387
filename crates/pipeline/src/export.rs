//! Zone Rasterizer / Exporter

use fieldzones_algorithms::gridding::{rasterize_first_match, ZoneGrid};
use fieldzones_cloud::{CloudError, ExportJob, ExportRequest, ImageryService};
use fieldzones_core::{Region, SampleSet, ZoneAssignment, ZoneRaster};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Burn zone labels onto a `scale_m` grid over the region's bounding box.
///
/// Each cell takes the label of the first sample (in sample order) that
/// falls in it; cells without samples are
/// [`ZONE_NODATA`](fieldzones_core::ZONE_NODATA).
pub fn rasterize(
    region: &Region,
    samples: &SampleSet,
    assignment: &ZoneAssignment,
    scale_m: f64,
) -> Result<ZoneRaster> {
    let grid = ZoneGrid::covering(&region.bbox(), scale_m)?;
    rasterize_on(&grid, samples, assignment)
}

fn rasterize_on(grid: &ZoneGrid, samples: &SampleSet, assignment: &ZoneAssignment) -> Result<ZoneRaster> {
    if samples.len() != assignment.len() {
        return Err(PipelineError::InvalidParameter {
            name: "assignment",
            reason: format!("{} labels for {} samples", assignment.len(), samples.len()),
        });
    }
    let raster = rasterize_first_match(grid, &samples.coords(), assignment.labels())?;
    tracing::debug!(
        "Zone raster {}x{} with {} labelled cell(s)",
        grid.cols,
        grid.rows,
        raster.valid_count()
    );
    Ok(raster)
}

/// A submitted export.
#[derive(Debug)]
pub struct ExportOutcome {
    /// Handle of the submitted job; not awaited by the pipeline
    pub job: ExportJob,
    pub rows: usize,
    pub cols: usize,
    /// Cells holding a zone label
    pub labelled_cells: usize,
}

/// Rasterizes zones and submits them to the imagery service for export.
pub struct ZoneExporter<'a> {
    service: &'a dyn ImageryService,
    scale_m: f64,
    folder: String,
    description: String,
    max_pixels: u64,
}

impl<'a> ZoneExporter<'a> {
    pub fn new(service: &'a dyn ImageryService, config: &PipelineConfig) -> Self {
        Self {
            service,
            scale_m: config.scale_m,
            folder: config.export_folder.clone(),
            description: config.export_description.clone(),
            max_pixels: config.max_pixels,
        }
    }

    /// Submit the zone raster. Returns as soon as the service accepts the
    /// job; a failure after acceptance is only visible through the handle.
    pub fn export(&self, region: &Region, samples: &SampleSet, assignment: &ZoneAssignment) -> Result<ExportOutcome> {
        let grid = ZoneGrid::covering(&region.bbox(), self.scale_m)?;
        let cells = grid.cell_count() as u64;
        if cells > self.max_pixels {
            return Err(CloudError::ExportRejected(format!(
                "raster has {} cells, limit is {}",
                cells, self.max_pixels
            ))
            .into());
        }

        let raster = rasterize_on(&grid, samples, assignment)?;
        let (rows, cols) = raster.shape();
        let labelled_cells = raster.valid_count();

        let job = self.service.submit_export(ExportRequest {
            raster,
            folder: self.folder.clone(),
            description: self.description.clone(),
            scale_m: self.scale_m,
            max_pixels: self.max_pixels,
            region_bbox: region.bbox(),
        })?;
        tracing::info!("Export {} submitted to {}", job.id(), job.destination());

        Ok(ExportOutcome {
            job,
            rows,
            cols,
            labelled_cells,
        })
    }
}
