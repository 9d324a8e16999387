//! Async STAC client for discovering scenes.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::time::Duration;

use fieldzones_core::{BBox, TimeWindow};

use crate::error::{CloudError, Result};
use crate::retry::send_with_retry;
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (root URL, e.g. `"https://my-stac.example.com/api/v1"`).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 100).
    pub max_items: usize,
    /// Page size requested from the catalog (default 50).
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 100,
            page_size: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    // ── Scene discovery ─────────────────────────────────────────────

    /// Scenes of `collection` intersecting `bbox` and acquired within
    /// `window`. Items whose date falls outside the window are dropped.
    pub async fn find_scenes(
        &self,
        bbox: &BBox,
        window: &TimeWindow,
        collection: &str,
    ) -> Result<Vec<StacItem>> {
        let params = StacSearchParams::new()
            .bbox(bbox)
            .datetime(&window.to_stac_interval())
            .collections(&[collection])
            .limit(self.options.page_size);

        let items = self.search_all(&params).await?;
        let total = items.len();
        let scenes: Vec<StacItem> = items
            .into_iter()
            .filter(|item| item.acquired().map_or(true, |d| window.contains(d)))
            .collect();

        tracing::debug!(
            "STAC search on {} returned {} item(s), {} within {}",
            self.catalog.search_url(),
            total,
            scenes.len(),
            window
        );
        Ok(scenes)
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;

        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            match next {
                Some(link) => {
                    page = self.follow_next(&link, params).await?;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        Ok(all_items)
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let resp = send_with_retry(
            || {
                self.client
                    .post(url)
                    .header("Content-Type", "application/json")
                    .json(params)
            },
            self.options.max_retries,
            "STAC search",
        )
        .await?;

        let body = resp
            .text()
            .await
            .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| CloudError::Decode(format!("parsing STAC response: {e}")))
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let body = next_page_body(link, original_params)?;
            let merged: StacSearchParams = serde_json::from_value(body)
                .map_err(|e| CloudError::Decode(format!("parsing merged params: {e}")))?;
            self.post_search(&link.href, &merged).await
        } else {
            let resp = send_with_retry(
                || self.client.get(&link.href),
                self.options.max_retries,
                "STAC pagination",
            )
            .await?;
            let body = resp
                .text()
                .await
                .map_err(|e| CloudError::Network(format!("reading pagination body: {e}")))?;
            serde_json::from_str(&body)
                .map_err(|e| CloudError::Decode(format!("parsing pagination response: {e}")))
        }
    }
}

/// Request body for a POST `next` link: the link body, merged over the
/// original parameters when `merge` is set.
fn next_page_body(link: &StacLink, original: &StacSearchParams) -> Result<serde_json::Value> {
    match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = serde_json::to_value(original)?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            Ok(base)
        }
        (Some(link_body), false) => Ok(link_body.clone()),
        (None, _) => Ok(serde_json::to_value(original)?),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
