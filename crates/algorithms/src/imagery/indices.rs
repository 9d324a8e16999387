//! Spectral indices used as zone features
//!
//! All indices operate on single-band rasters sharing one grid. Pixels where
//! any input is nodata come out as NaN.

use crate::maybe_rayon::*;
use fieldzones_core::raster::Raster;
use fieldzones_core::{Error, Result};
use ndarray::Array2;

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1] for non-negative reflectances. Pixels where
/// the sum is zero are set to NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    combine(band_a, band_b, |a, b| {
        let sum = a + b;
        if sum.abs() < 1e-10 {
            f64::NAN
        } else {
            (a - b) / sum
        }
    })
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`, Sentinel-2 bands B8 and B4.
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Normalized Difference Red Edge index
///
/// `NDRE = (NIR - RedEdge) / (NIR + RedEdge)`, Sentinel-2 bands B8 and B5.
/// Saturates later than NDVI over dense canopies.
pub fn ndre(nir: &Raster<f64>, red_edge: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red_edge)
}

/// Soil Brightness Index
///
/// `SBI = sqrt(Blue² + Green²)`, Sentinel-2 bands B2 and B3.
pub fn sbi(blue: &Raster<f64>, green: &Raster<f64>) -> Result<Raster<f64>> {
    combine(blue, green, |b, g| (b * b + g * g).sqrt())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn combine<F>(a: &Raster<f64>, b: &Raster<f64>, op: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    check_dimensions(a, b)?;

    let (rows, cols) = a.shape();
    let (da, db) = (a.data(), b.data());

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let va = da[[row, col]];
                    let vb = db[[row, col]];
                    if a.is_nodata(va) || b.is_nodata(vb) {
                        f64::NAN
                    } else {
                        op(va, vb)
                    }
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    build_output(a, rows, cols, data)
}

fn check_dimensions(a: &Raster<f64>, b: &Raster<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}

fn build_output(template: &Raster<f64>, rows: usize, cols: usize, data: Vec<f64>) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
