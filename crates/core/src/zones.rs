//! Zone labels and the zone raster

use crate::error::{Error, Result};
use crate::raster::Raster;

/// Nodata value of a [`ZoneRaster`]: cells no sample landed in.
pub const ZONE_NODATA: u8 = 255;

/// Raster of 0-based zone labels over the region's bounding box.
pub type ZoneRaster = Raster<u8>;

/// One zone label per sample, index-aligned with the [`SampleSet`] it was
/// computed from.
///
/// [`SampleSet`]: crate::SampleSet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAssignment {
    k: usize,
    labels: Vec<usize>,
}

impl ZoneAssignment {
    /// Fails if any label is outside `[0, k)`.
    pub fn new(k: usize, labels: Vec<usize>) -> Result<Self> {
        if k == 0 || k > ZONE_NODATA as usize {
            return Err(Error::InvalidParameter {
                name: "k",
                value: k.to_string(),
                reason: format!("must be in 1..={}", ZONE_NODATA),
            });
        }
        if let Some((i, &label)) = labels.iter().enumerate().find(|(_, &l)| l >= k) {
            return Err(Error::InvalidParameter {
                name: "labels",
                value: format!("label {} at sample {}", label, i),
                reason: format!("must be < k ({})", k),
            });
        }
        Ok(Self { k, labels })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of samples per zone, indexed by label
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.k];
        for &l in &self.labels {
            counts[l] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_zone() {
        let a = ZoneAssignment::new(3, vec![0, 2, 2, 0, 2]).unwrap();
        assert_eq!(a.counts(), vec![2, 0, 3]);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn rejects_label_out_of_range() {
        assert!(ZoneAssignment::new(2, vec![0, 1, 2]).is_err());
        assert!(ZoneAssignment::new(0, vec![]).is_err());
    }
}
