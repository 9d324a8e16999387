//! Point samples and the named features they carry

use crate::error::{Error, Result};
use crate::vector::BBox;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named per-pixel feature in the composite image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Normalized Difference Vegetation Index, (B8 - B4) / (B8 + B4)
    Ndvi,
    /// Normalized Difference Red Edge index, (B8 - B5) / (B8 + B5)
    Ndre,
    /// Soil Brightness Index, sqrt(B2² + B3²)
    Sbi,
    /// Terrain elevation in metres
    Altitude,
}

impl Feature {
    /// The four features in their fixed sampling order
    pub const ALL: [Feature; 4] = [Feature::Ndvi, Feature::Ndre, Feature::Sbi, Feature::Altitude];

    /// Band name in the composite image
    pub fn band_name(&self) -> &'static str {
        match self {
            Feature::Ndvi => "NDVI",
            Feature::Ndre => "NDRE",
            Feature::Sbi => "SBI",
            Feature::Altitude => "ALT",
        }
    }

    /// Human-readable label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Feature::Altitude => "Altitude",
            other => other.band_name(),
        }
    }

    /// Decimal places used when reporting this feature
    pub fn decimals(&self) -> usize {
        match self {
            Feature::Altitude => 2,
            _ => 3,
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Feature::Altitude => Some("m"),
            _ => None,
        }
    }

    /// Format a value with this feature's precision and unit
    pub fn format_value(&self, value: f64) -> String {
        match self.unit() {
            Some(unit) => format!("{:.*} {}", self.decimals(), value, unit),
            None => format!("{:.*}", self.decimals(), value),
        }
    }

    /// Parse a band name (case-insensitive)
    pub fn from_band_name(name: &str) -> Option<Feature> {
        Feature::ALL
            .into_iter()
            .find(|f| f.band_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.band_name())
    }
}

/// One sampled pixel: its location and feature values in feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub values: Vec<f64>,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, values: Vec<f64>) -> Self {
        Self { x, y, values }
    }
}

/// An ordered collection of samples sharing one feature list.
///
/// Every point carries exactly one value per feature, so point `i`'s
/// coordinate, its feature vector and (later) its zone label stay aligned by
/// index.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    features: Vec<Feature>,
    points: Vec<SamplePoint>,
}

impl SampleSet {
    pub fn new(features: Vec<Feature>, points: Vec<SamplePoint>) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::InvalidParameter {
                name: "features",
                value: "[]".into(),
                reason: "at least one feature is required".into(),
            });
        }
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.values.len() != features.len())
        {
            return Err(Error::InvalidParameter {
                name: "values",
                value: format!("sample {} has {} values", i, p.values.len()),
                reason: format!("expected one value per feature ({})", features.len()),
            });
        }
        Ok(Self { features, points })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Feature vectors as an `n_samples × n_features` matrix
    pub fn feature_matrix(&self) -> Array2<f64> {
        let n_features = self.features.len();
        Array2::from_shape_fn((self.points.len(), n_features), |(i, j)| {
            self.points[i].values[j]
        })
    }

    /// `(x, y)` of every sample, in sample order
    pub fn coords(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p.x, p.y)).collect()
    }

    /// Bounding box of all sample coordinates
    pub fn extent(&self) -> Option<BBox> {
        let first = self.points.first()?;
        let init = BBox::new(first.x, first.y, first.x, first.y);
        Some(self.points.iter().fold(init, |b, p| {
            BBox::new(b.min_x.min(p.x), b.min_y.min(p.y), b.max_x.max(p.x), b.max_y.max(p.y))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_formatting() {
        assert_eq!(Feature::Ndvi.format_value(0.51234), "0.512");
        assert_eq!(Feature::Altitude.format_value(812.3456), "812.35 m");
        assert_eq!(Feature::Altitude.label(), "Altitude");
        assert_eq!(Feature::from_band_name("alt"), Some(Feature::Altitude));
        assert_eq!(Feature::from_band_name("B8"), None);
    }

    #[test]
    fn sample_set_rejects_arity_mismatch() {
        let points = vec![
            SamplePoint::new(0.0, 0.0, vec![1.0, 2.0]),
            SamplePoint::new(1.0, 1.0, vec![1.0]),
        ];
        let err = SampleSet::new(vec![Feature::Ndvi, Feature::Ndre], points);
        assert!(matches!(err, Err(Error::InvalidParameter { name: "values", .. })));
    }

    #[test]
    fn feature_matrix_preserves_order() {
        let set = SampleSet::new(
            vec![Feature::Ndvi, Feature::Altitude],
            vec![
                SamplePoint::new(0.0, 0.0, vec![0.1, 100.0]),
                SamplePoint::new(1.0, 2.0, vec![0.2, 200.0]),
            ],
        )
        .unwrap();

        let m = set.feature_matrix();
        assert_eq!(m.dim(), (2, 2));
        assert_eq!(m[[1, 0]], 0.2);
        assert_eq!(m[[1, 1]], 200.0);
        assert_eq!(set.coords(), vec![(0.0, 0.0), (1.0, 2.0)]);
        assert_eq!(set.extent(), Some(BBox::new(0.0, 0.0, 1.0, 2.0)));
    }
}
