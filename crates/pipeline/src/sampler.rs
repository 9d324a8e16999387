//! Feature Sampler: composite imagery over the field and sample it.

use fieldzones_cloud::{CompositeRequest, ImageryService, Reducer, SampleRequest};
use fieldzones_core::{Feature, Region, SamplePoint, SampleSet, TimeWindow};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Spectral features requested from the service; elevation is appended.
pub const SPECTRAL_FEATURES: [Feature; 3] = [Feature::Ndvi, Feature::Ndre, Feature::Sbi];

/// Samples NDVI, NDRE, SBI and altitude at pixels inside a region.
pub struct FeatureSampler<'a> {
    service: &'a dyn ImageryService,
    sample_count: usize,
    scale_m: f64,
    seed: u64,
    collection: String,
}

impl<'a> FeatureSampler<'a> {
    pub fn new(service: &'a dyn ImageryService, config: &PipelineConfig) -> Self {
        Self {
            service,
            sample_count: config.sample_count,
            scale_m: config.scale_m,
            seed: config.seed,
            collection: config.collection.clone(),
        }
    }

    /// Median composite over `window`, sampled at up to `sample_count`
    /// pixels inside `region`.
    ///
    /// Every returned point lies within the region's bounding box and
    /// carries one finite-coordinate value per feature.
    pub fn sample(&self, region: &Region, window: &TimeWindow) -> Result<SampleSet> {
        let composite = self.service.composite(&CompositeRequest {
            region,
            window: *window,
            collection: self.collection.clone(),
            features: SPECTRAL_FEATURES.to_vec(),
            reducer: Reducer::Median,
            include_elevation: true,
        })?;
        if composite.is_empty() {
            return Err(PipelineError::NoImagery(*window));
        }
        tracing::info!(
            "Composite of {} scene(s) from {}",
            composite.scene_count,
            self.service.name()
        );

        let raw = self.service.sample(
            &composite,
            &SampleRequest {
                region,
                scale_m: self.scale_m,
                num_pixels: self.sample_count,
                seed: self.seed,
                drop_nulls: true,
            },
        );
        self.service.release(&composite);
        let raw = raw?;

        let points = self.keep_inside(region, raw);
        if points.is_empty() {
            return Err(PipelineError::NoSamples);
        }
        tracing::info!("Sampled {} pixel(s)", points.len());

        Ok(SampleSet::new(composite.bands, points)?)
    }

    fn keep_inside(&self, region: &Region, raw: Vec<SamplePoint>) -> Vec<SamplePoint> {
        let bbox = region.bbox();
        let received = raw.len();

        let mut points: Vec<SamplePoint> = raw
            .into_iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite() && bbox.contains_point(p.x, p.y))
            .collect();

        let outside = received - points.len();
        if outside > 0 {
            tracing::warn!("Discarded {} sample(s) outside the field bounds", outside);
        }
        if points.len() > self.sample_count {
            tracing::debug!("Truncating {} samples to {}", points.len(), self.sample_count);
            points.truncate(self.sample_count);
        }
        points
    }
}
