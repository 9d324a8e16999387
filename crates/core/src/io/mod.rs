//! I/O for boundary archives, shapefiles and GeoTIFF rasters

pub mod archive;
mod native;
pub mod shapefile;

pub use archive::{sibling_prj, ExtractedArchive};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    write_zone_geotiff, zone_geotiff_to_buffer,
};
