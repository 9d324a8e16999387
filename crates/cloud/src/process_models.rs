//! Wire types of the remote processing endpoint.
//!
//! All bodies are JSON. Band names use the short identifiers of
//! [`Feature::band_name`] (`NDVI`, `NDRE`, `SBI`, `ALT`).

use crate::error::{CloudError, Result};
use crate::export::ExportStatus;
use crate::service::{CompositeHandle, CompositeRequest, SampleRequest};
use fieldzones_core::{Feature, SamplePoint};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST {base}/composites`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositeBody {
    /// Region as a GeoJSON polygon
    pub geometry: serde_json::Value,
    /// First acquisition date, `YYYY-MM-DD`
    pub start: String,
    /// Day after the last acquisition date, `YYYY-MM-DD`
    pub end_exclusive: String,
    pub collection: String,
    /// Scenes found by the catalog search; empty lets the service choose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scene_ids: Vec<String>,
    pub bands: Vec<String>,
    pub reducer: String,
    pub include_elevation: bool,
}

impl CompositeBody {
    pub fn from_request(request: &CompositeRequest<'_>, scene_ids: Vec<String>) -> Result<Self> {
        let end_exclusive = request
            .window
            .end()
            .succ_opt()
            .ok_or_else(|| CloudError::InvalidRequest(format!("window end {} out of range", request.window.end())))?;

        Ok(Self {
            geometry: request.region.to_geojson(),
            start: request.window.start().format("%Y-%m-%d").to_string(),
            end_exclusive: end_exclusive.format("%Y-%m-%d").to_string(),
            collection: request.collection.clone(),
            scene_ids,
            bands: request.features.iter().map(|f| f.band_name().to_string()).collect(),
            reducer: request.reducer.as_str().to_string(),
            include_elevation: request.include_elevation,
        })
    }
}

/// Body of `POST {base}/composites/{id}/samples`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplesBody {
    pub geometry: serde_json::Value,
    pub scale: f64,
    pub num_pixels: usize,
    pub seed: u64,
    pub drop_nulls: bool,
}

impl SamplesBody {
    pub fn from_request(request: &SampleRequest<'_>) -> Self {
        Self {
            geometry: request.region.to_geojson(),
            scale: request.scale_m,
            num_pixels: request.num_pixels,
            seed: request.seed,
            drop_nulls: request.drop_nulls,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CompositeResponse {
    pub id: String,
    pub scene_count: usize,
    pub bands: Vec<String>,
}

impl CompositeResponse {
    pub fn into_handle(self) -> Result<CompositeHandle> {
        let bands = self
            .bands
            .iter()
            .map(|name| {
                Feature::from_band_name(name)
                    .ok_or_else(|| CloudError::Decode(format!("unknown band '{}' in composite", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompositeHandle {
            id: self.id,
            scene_count: self.scene_count,
            bands,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSample {
    pub lon: f64,
    pub lat: f64,
    /// One entry per composite band; `null` for masked pixels.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplesResponse {
    pub samples: Vec<RemoteSample>,
}

impl SamplesResponse {
    /// Convert to sample points with `band_count` values each. Nulls
    /// become NaN.
    pub fn into_points(self, band_count: usize) -> Result<Vec<SamplePoint>> {
        self.samples
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                if s.values.len() != band_count {
                    return Err(CloudError::Decode(format!(
                        "sample {} has {} values, expected {}",
                        i,
                        s.values.len(),
                        band_count
                    )));
                }
                let values = s.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                Ok(SamplePoint::new(s.lon, s.lat, values))
            })
            .collect()
    }
}

/// Reply to an export submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportAccepted {
    pub job_id: String,
    pub state: String,
}

/// Reply of `GET {base}/exports/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportStateResponse {
    pub state: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExportStateResponse {
    pub fn into_status(self) -> Result<ExportStatus> {
        ExportStatus::from_state(&self.state, self.location, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Reducer;
    use fieldzones_core::{Region, TimeWindow};

    fn region() -> Region {
        Region::from_lon_lat(&[(-50.0, -17.0), (-49.99, -17.0), (-49.99, -16.99), (-50.0, -16.99)]).unwrap()
    }

    #[test]
    fn composite_body_uses_exclusive_end() {
        let region = region();
        let request = CompositeRequest {
            region: &region,
            window: TimeWindow::parse("2025-01-01", "2025-03-31").unwrap(),
            collection: "sentinel-2-l2a".into(),
            features: vec![Feature::Ndvi, Feature::Ndre, Feature::Sbi],
            reducer: Reducer::Median,
            include_elevation: true,
        };
        let body = CompositeBody::from_request(&request, vec!["S2A_1".into()]).unwrap();

        assert_eq!(body.start, "2025-01-01");
        assert_eq!(body.end_exclusive, "2025-04-01");
        assert_eq!(body.bands, vec!["NDVI", "NDRE", "SBI"]);
        assert_eq!(body.reducer, "median");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["geometry"]["type"], "Polygon");
        assert_eq!(json["scene_ids"], serde_json::json!(["S2A_1"]));
    }

    #[test]
    fn composite_response_maps_bands() {
        let resp: CompositeResponse =
            serde_json::from_str(r#"{"id":"c-1","scene_count":7,"bands":["NDVI","ndre","SBI","ALT"]}"#).unwrap();
        let handle = resp.into_handle().unwrap();
        assert_eq!(handle.scene_count, 7);
        assert_eq!(handle.bands, Feature::ALL.to_vec());

        let bad: CompositeResponse = serde_json::from_str(r#"{"id":"c","scene_count":1,"bands":["EVI"]}"#).unwrap();
        assert!(bad.into_handle().is_err());
    }

    #[test]
    fn null_values_become_nan() {
        let resp: SamplesResponse =
            serde_json::from_str(r#"{"samples":[{"lon":-49.995,"lat":-16.995,"values":[0.8,null]}]}"#).unwrap();
        let points = resp.clone().into_points(2).unwrap();
        assert_eq!(points[0].values[0], 0.8);
        assert!(points[0].values[1].is_nan());
        assert!(resp.into_points(3).is_err());
    }

    #[test]
    fn export_state_response() {
        let resp: ExportStateResponse =
            serde_json::from_str(r#"{"state":"COMPLETED","location":"zone_exports/z.tif"}"#).unwrap();
        assert_eq!(
            resp.into_status().unwrap(),
            ExportStatus::Completed { location: "zone_exports/z.tif".into() }
        );
    }
}
