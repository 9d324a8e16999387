//! # FieldZones Algorithms
//!
//! Numerical building blocks of the management-zone pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **classification**: Multi-dimensional k-means with k-means++ seeding
//! - **imagery**: Spectral indices (NDVI, NDRE, SBI) and median compositing
//! - **sampling**: Pixel selection inside a polygon
//! - **gridding**: Rasterizing labelled points onto a geographic grid
//! - **statistics**: Feature means, overall and per zone

pub mod classification;
pub mod gridding;
pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod sampling;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{kmeans, standardize, KmeansParams, KmeansResult};
    pub use crate::gridding::{geographic_cell_size, rasterize_first_match, ZoneGrid};
    pub use crate::imagery::{median_composite, ndre, ndvi, normalized_difference, sbi};
    pub use crate::sampling::{choose_without_replacement, pixels_in_polygon};
    pub use crate::statistics::{column_means, grouped_means, GroupMeans};
    pub use fieldzones_core::prelude::*;
}
