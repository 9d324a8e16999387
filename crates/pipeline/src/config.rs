//! Run configuration

use crate::error::{PipelineError, Result};
use crate::geometry::PolygonPolicy;
use fieldzones_core::TimeWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest zone count accepted for a run.
pub const MIN_ZONES: usize = 2;
/// Largest zone count accepted for a run.
pub const MAX_ZONES: usize = 7;

/// Settings shared by every run of a pipeline.
///
/// Every field has a default, so a JSON file only needs the fields it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on sampled pixels
    pub sample_count: usize,
    /// Sampling and export resolution in metres
    pub scale_m: f64,
    /// Seed for pixel sampling and k-means initialisation
    pub seed: u64,
    /// Imagery collection identifier
    pub collection: String,
    pub export_folder: String,
    pub export_description: String,
    /// Largest zone raster (in cells) the export destination accepts
    pub max_pixels: u64,
    /// Z-score each feature before clustering
    pub standardize: bool,
    pub polygon_policy: PolygonPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_count: 5000,
            scale_m: 10.0,
            seed: 42,
            collection: "sentinel-2-l2a".to_string(),
            export_folder: "zone_exports".to_string(),
            export_description: "management_zones_export".to_string(),
            max_pixels: 10_000_000_000_000,
            standardize: false,
            polygon_policy: PolygonPolicy::First,
        }
    }
}

impl PipelineConfig {
    /// Load overrides from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Output(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| PipelineError::InvalidParameter {
            name: "config",
            reason: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name, reason: &str| {
            Err(PipelineError::InvalidParameter {
                name,
                reason: reason.to_string(),
            })
        };
        if self.sample_count == 0 {
            return invalid("sample_count", "must be at least 1");
        }
        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return invalid("scale_m", "must be a positive number of metres");
        }
        if self.collection.trim().is_empty() {
            return invalid("collection", "must not be empty");
        }
        if self.export_folder.trim().is_empty() || self.export_description.trim().is_empty() {
            return invalid("export", "folder and description must not be empty");
        }
        if self.max_pixels == 0 {
            return invalid("max_pixels", "must be at least 1");
        }
        Ok(())
    }
}

/// Per-run inputs chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub window: TimeWindow,
    /// Number of management zones
    pub zones: usize,
}

impl Default for RunParams {
    fn default() -> Self {
        let date = |month, day| chrono::NaiveDate::from_ymd_opt(2025, month, day).unwrap_or_default();
        Self {
            window: TimeWindow::spanning(date(1, 1), date(3, 31)),
            zones: 4,
        }
    }
}

impl RunParams {
    pub fn validate(&self) -> Result<()> {
        validate_zones(self.zones)
    }
}

/// Check `zones` against [`MIN_ZONES`]..=[`MAX_ZONES`].
pub fn validate_zones(zones: usize) -> Result<()> {
    if !(MIN_ZONES..=MAX_ZONES).contains(&zones) {
        return Err(PipelineError::InvalidParameter {
            name: "zones",
            reason: format!("must be between {} and {}, got {}", MIN_ZONES, MAX_ZONES, zones),
        });
    }
    Ok(())
}
