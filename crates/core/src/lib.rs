//! # FieldZones Core
//!
//! Core types, CRS handling and I/O for the FieldZones management-zone pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid (used for zone rasters and scene bands)
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS` / `Projection`: Coordinate reference systems and inverse projection to WGS84
//! - `Region`, `TimeWindow`, `SampleSet`, `ZoneAssignment`: the pipeline data model
//! - I/O for zipped shapefiles and GeoTIFF

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod sample;
pub mod time;
pub mod vector;
pub mod zones;

pub use crs::{Projection, CRS};
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use sample::{Feature, SamplePoint, SampleSet};
pub use time::TimeWindow;
pub use vector::{BBox, Region};
pub use zones::{ZoneAssignment, ZoneRaster, ZONE_NODATA};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{Projection, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::sample::{Feature, SamplePoint, SampleSet};
    pub use crate::time::TimeWindow;
    pub use crate::vector::{BBox, Region};
    pub use crate::zones::{ZoneAssignment, ZoneRaster, ZONE_NODATA};
}
