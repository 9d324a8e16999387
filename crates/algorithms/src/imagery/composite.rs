//! Per-pixel temporal median over a stack of co-registered layers

use crate::maybe_rayon::*;
use fieldzones_core::raster::Raster;
use fieldzones_core::{Error, Result};
use ndarray::Array2;

/// Median of the valid values at each pixel.
///
/// NaN and nodata values are skipped; a pixel with no valid value in any
/// layer is NaN. With an even count the two middle values are averaged.
pub fn median_composite(layers: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let first = layers
        .first()
        .ok_or_else(|| Error::Algorithm("median composite of an empty stack".into()))?;
    if let Some(other) = layers.iter().find(|l| !first.same_grid(**l)) {
        return Err(Error::SizeMismatch {
            er: first.rows(),
            ec: first.cols(),
            ar: other.rows(),
            ac: other.cols(),
        });
    }

    let (rows, cols) = first.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut stack = Vec::with_capacity(layers.len());
            (0..cols)
                .map(|col| {
                    stack.clear();
                    stack.extend(
                        layers
                            .iter()
                            .map(|l| (l, l.data()[[row, col]]))
                            .filter(|(l, v)| !l.is_nodata(*v))
                            .map(|(_, v)| v),
                    );
                    median(&mut stack)
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    let mut output = first.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldzones_core::GeoTransform;

    fn layer(values: Vec<f64>) -> Raster<f64> {
        let mut r = Raster::from_vec(values, 1, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        r
    }

    #[test]
    fn odd_and_even_stacks() {
        let a = layer(vec![1.0, 4.0]);
        let b = layer(vec![3.0, f64::NAN]);
        let c = layer(vec![2.0, 2.0]);

        let result = median_composite(&[&a, &b, &c]).unwrap();
        assert_eq!(result.get(0, 0).unwrap(), 2.0);
        // NaN skipped: median of [2, 4]
        assert_eq!(result.get(0, 1).unwrap(), 3.0);
    }

    #[test]
    fn all_invalid_pixel_is_nan() {
        let a = layer(vec![f64::NAN, 1.0]);
        let result = median_composite(&[&a]).unwrap();
        assert!(result.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn rejects_empty_and_mismatched() {
        assert!(median_composite(&[]).is_err());
        let a = layer(vec![1.0, 2.0]);
        let b = Raster::filled(2, 2, 1.0);
        assert!(median_composite(&[&a, &b]).is_err());
    }
}
