//! Remote imagery backend: STAC scene search plus a JSON processing endpoint.
//!
//! The async clients run on a single-threaded Tokio runtime owned by
//! [`RemoteImagery`], so callers use a plain blocking API.

use std::sync::Arc;
use std::time::Duration;

use fieldzones_core::io::zone_geotiff_to_buffer;
use fieldzones_core::SamplePoint;
use tokio::runtime::Runtime;

use crate::auth::{CloudAuth, NoAuth};
use crate::error::{CloudError, Result};
use crate::export::{ExportJob, ExportStatus, JobSource};
use crate::process_models::{
    CompositeBody, CompositeResponse, ExportAccepted, ExportStateResponse, SamplesBody, SamplesResponse,
};
use crate::retry::send_with_retry;
use crate::service::{CompositeHandle, CompositeRequest, ExportRequest, ImageryService, SampleRequest};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};

// ---------------------------------------------------------------------------
// Processing client
// ---------------------------------------------------------------------------

/// Configuration for [`ProcessingClient`].
#[derive(Debug, Clone)]
pub struct ProcessingClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
}

impl Default for ProcessingClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Async client for the processing endpoint.
pub struct ProcessingClient {
    base_url: String,
    client: reqwest::Client,
    auth: Box<dyn CloudAuth>,
    options: ProcessingClientOptions,
}

impl ProcessingClient {
    pub fn new(base_url: &str, auth: Box<dyn CloudAuth>, options: ProcessingClientOptions) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CloudError::InvalidRequest(format!(
                "processing endpoint must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            client,
            auth,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn composites_url(&self) -> String {
        format!("{}/composites", self.base_url)
    }

    pub fn samples_url(&self, composite_id: &str) -> String {
        format!("{}/composites/{}/samples", self.base_url, composite_id)
    }

    pub fn exports_url(&self) -> String {
        format!("{}/exports", self.base_url)
    }

    pub fn export_status_url(&self, job_id: &str) -> String {
        format!("{}/exports/{}", self.base_url, job_id)
    }

    fn headers(&self, url: &str, method: &str) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::new();
        self.auth.sign_request(url, method, &mut headers)?;
        Ok(headers)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, what: &str) -> Result<R>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let headers = self.headers(url, "POST")?;
        let resp = send_with_retry(
            || {
                let mut req = self.client.post(url).json(body);
                for (k, v) in &headers {
                    req = req.header(k.as_str(), v.as_str());
                }
                req
            },
            self.options.max_retries,
            what,
        )
        .await?;
        decode(resp, what).await
    }

    pub async fn create_composite(&self, body: &CompositeBody) -> Result<CompositeResponse> {
        self.post_json(&self.composites_url(), body, "composite").await
    }

    pub async fn sample(&self, composite_id: &str, body: &SamplesBody) -> Result<SamplesResponse> {
        self.post_json(&self.samples_url(composite_id), body, "sample").await
    }

    /// Upload a GeoTIFF for export.
    pub async fn submit_export(
        &self,
        folder: &str,
        description: &str,
        scale_m: f64,
        max_pixels: u64,
        tiff: Vec<u8>,
    ) -> Result<ExportAccepted> {
        let url = self.exports_url();
        let headers = self.headers(&url, "POST")?;
        let query = [
            ("folder", folder.to_string()),
            ("description", description.to_string()),
            ("scale", scale_m.to_string()),
            ("max_pixels", max_pixels.to_string()),
        ];
        let resp = send_with_retry(
            || {
                let mut req = self
                    .client
                    .post(&url)
                    .query(&query)
                    .header("Content-Type", "image/tiff")
                    .body(tiff.clone());
                for (k, v) in &headers {
                    req = req.header(k.as_str(), v.as_str());
                }
                req
            },
            self.options.max_retries,
            "export",
        )
        .await?;
        decode(resp, "export").await
    }

    pub async fn export_state(&self, job_id: &str) -> Result<ExportStateResponse> {
        let url = self.export_status_url(job_id);
        let headers = self.headers(&url, "GET")?;
        let resp = send_with_retry(
            || {
                let mut req = self.client.get(&url);
                for (k, v) in &headers {
                    req = req.header(k.as_str(), v.as_str());
                }
                req
            },
            self.options.max_retries,
            "export status",
        )
        .await?;
        decode(resp, "export status").await
    }
}

async fn decode<R: serde::de::DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<R> {
    let body = resp
        .text()
        .await
        .map_err(|e| CloudError::Network(format!("reading {} response: {e}", what)))?;
    serde_json::from_str(&body).map_err(|e| CloudError::Decode(format!("parsing {} response: {e}", what)))
}

// ---------------------------------------------------------------------------
// Blocking backend
// ---------------------------------------------------------------------------

/// Settings for [`RemoteImagery::connect`].
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Processing endpoint base URL
    pub endpoint: String,
    /// Optional bearer token for the processing endpoint
    pub token: Option<String>,
    pub catalog: StacCatalog,
    pub stac: StacClientOptions,
    pub processing: ProcessingClientOptions,
}

impl RemoteOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            catalog: StacCatalog::EarthSearch,
            stac: StacClientOptions::default(),
            processing: ProcessingClientOptions::default(),
        }
    }
}

/// [`ImageryService`] backed by a STAC catalog and a processing endpoint.
pub struct RemoteImagery {
    rt: Arc<Runtime>,
    stac: StacClient,
    processing: Arc<ProcessingClient>,
}

impl RemoteImagery {
    pub fn connect(options: RemoteOptions) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;

        let auth: Box<dyn CloudAuth> = match options.token {
            Some(token) => Box::new(crate::auth::BearerToken::new(token)?),
            None => Box::new(NoAuth),
        };

        let stac = StacClient::new(options.catalog, options.stac)?;
        let processing = ProcessingClient::new(&options.endpoint, auth, options.processing)?;
        tracing::debug!(
            "Remote imagery: catalog {}, endpoint {}",
            stac.catalog().search_url(),
            processing.base_url()
        );

        Ok(Self {
            rt: Arc::new(rt),
            stac,
            processing: Arc::new(processing),
        })
    }
}

impl ImageryService for RemoteImagery {
    fn name(&self) -> &str {
        "remote"
    }

    fn composite(&self, request: &CompositeRequest<'_>) -> Result<CompositeHandle> {
        let scenes = self.rt.block_on(self.stac.find_scenes(
            &request.region.bbox(),
            &request.window,
            &request.collection,
        ))?;

        let mut bands = request.features.clone();
        if request.include_elevation && !bands.contains(&fieldzones_core::Feature::Altitude) {
            bands.push(fieldzones_core::Feature::Altitude);
        }
        if scenes.is_empty() {
            tracing::info!("No {} scenes between {}", request.collection, request.window);
            return Ok(CompositeHandle::empty(bands));
        }

        let scene_ids = scenes.into_iter().map(|s| s.id).collect();
        let body = CompositeBody::from_request(request, scene_ids)?;
        let handle = self.rt.block_on(self.processing.create_composite(&body))?.into_handle()?;
        tracing::debug!("Composite {} built from {} scene(s)", handle.id, handle.scene_count);
        Ok(handle)
    }

    fn sample(&self, composite: &CompositeHandle, request: &SampleRequest<'_>) -> Result<Vec<SamplePoint>> {
        if composite.is_empty() {
            return Ok(Vec::new());
        }
        let body = SamplesBody::from_request(request);
        let resp = self.rt.block_on(self.processing.sample(&composite.id, &body))?;
        resp.into_points(composite.bands.len())
    }

    fn submit_export(&self, request: ExportRequest) -> Result<ExportJob> {
        let cells = request.raster.rows() as u64 * request.raster.cols() as u64;
        if cells > request.max_pixels {
            return Err(CloudError::ExportRejected(format!(
                "raster has {} cells, limit is {}",
                cells, request.max_pixels
            )));
        }

        let tiff = zone_geotiff_to_buffer(&request.raster)?;
        let accepted = self.rt.block_on(self.processing.submit_export(
            &request.folder,
            &request.description,
            request.scale_m,
            request.max_pixels,
            tiff,
        ))?;
        let status = ExportStatus::from_state(&accepted.state, None, None)?;
        tracing::debug!("Export job {} accepted ({})", accepted.job_id, status);

        let source = RemoteJobSource {
            rt: Arc::clone(&self.rt),
            client: Arc::clone(&self.processing),
            job_id: accepted.job_id.clone(),
        };
        Ok(ExportJob::new(
            accepted.job_id,
            format!("{}/{}", request.folder, request.description),
            status,
            Box::new(source),
        ))
    }
}

/// Polls `GET {base}/exports/{job_id}`.
struct RemoteJobSource {
    rt: Arc<Runtime>,
    client: Arc<ProcessingClient>,
    job_id: String,
}

impl JobSource for RemoteJobSource {
    fn refresh(&mut self, wait: Option<Duration>) -> Result<Option<ExportStatus>> {
        if let Some(d) = wait {
            std::thread::sleep(d);
        }
        let state = self.rt.block_on(self.client.export_state(&self.job_id))?;
        state.into_status().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ProcessingClient {
        ProcessingClient::new(base, Box::new(NoAuth), ProcessingClientOptions::default()).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let c = client("https://zones.example.com/api/");
        assert_eq!(c.base_url(), "https://zones.example.com/api");
        assert_eq!(c.composites_url(), "https://zones.example.com/api/composites");
        assert_eq!(c.samples_url("c-9"), "https://zones.example.com/api/composites/c-9/samples");
        assert_eq!(c.exports_url(), "https://zones.example.com/api/exports");
        assert_eq!(c.export_status_url("j-1"), "https://zones.example.com/api/exports/j-1");
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(ProcessingClient::new("ftp://x", Box::new(NoAuth), ProcessingClientOptions::default()).is_err());
    }

    #[test]
    fn connect_validates_token() {
        let mut options = RemoteOptions::new("https://zones.example.com");
        options.token = Some("two words".into());
        assert!(matches!(RemoteImagery::connect(options), Err(CloudError::Auth(_))));

        let remote = RemoteImagery::connect(RemoteOptions::new("https://zones.example.com")).unwrap();
        assert_eq!(remote.name(), "remote");
    }
}
