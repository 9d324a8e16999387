//! Zone Classifier: k-means over the sampled feature vectors

use fieldzones_algorithms::classification::{kmeans, standardize, KmeansParams};
use fieldzones_core::{SampleSet, ZoneAssignment};

use crate::config::{validate_zones, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Groups samples into `k` management zones.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    seed: u64,
    standardize: bool,
}

impl ZoneClassifier {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            seed: config.seed,
            standardize: config.standardize,
        }
    }

    /// Label every sample with a zone in `0..k`.
    ///
    /// The same samples and seed always give the same labels. Label numbers
    /// carry no ordering meaning.
    pub fn classify(&self, samples: &SampleSet, k: usize) -> Result<ZoneAssignment> {
        validate_zones(k)?;
        if samples.is_empty() {
            return Err(PipelineError::NoSamples);
        }

        for (i, point) in samples.points().iter().enumerate() {
            if let Some((j, v)) = point.values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(PipelineError::InvalidParameter {
                    name: "samples",
                    reason: format!("sample {} has {} = {}", i, samples.features()[j], v),
                });
            }
        }

        let mut data = samples.feature_matrix();
        if self.standardize {
            data = standardize(data.view());
        }

        let params = KmeansParams {
            k,
            seed: self.seed,
            ..Default::default()
        };
        let result = kmeans(data.view(), &params).map_err(|e| PipelineError::InvalidParameter {
            name: "zones",
            reason: e.to_string(),
        })?;
        tracing::debug!(
            "k-means: k = {}, inertia {:.6}, {} iterations",
            k,
            result.inertia,
            result.iterations
        );

        let assignment = ZoneAssignment::new(k, result.labels)?;
        tracing::info!("Zone sizes: {:?}", assignment.counts());
        Ok(assignment)
    }
}
