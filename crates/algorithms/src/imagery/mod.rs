//! Imagery algorithms
//!
//! - Spectral indices: NDVI, NDRE, SBI
//! - Normalized difference: generic two-band index
//! - Median composite: per-pixel temporal reducer over a scene stack

mod composite;
mod indices;

pub use composite::median_composite;
pub use indices::{ndre, ndvi, normalized_difference, sbi};
