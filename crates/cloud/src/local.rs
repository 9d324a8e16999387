//! In-process imagery backend over co-registered scene rasters.
//!
//! Scenes hold the raw Sentinel-2 bands needed for the zone features
//! (B2, B3, B4, B5, B8) on one geographic grid, plus a static elevation
//! raster on the same grid. Results are deterministic for a given seed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use fieldzones_algorithms::imagery::{median_composite, ndre, ndvi, sbi};
use fieldzones_algorithms::sampling::{choose_without_replacement, pixels_in_polygon};
use fieldzones_core::io::read_geotiff;
use fieldzones_core::{BBox, Feature, Raster, SamplePoint};
use serde::Deserialize;

use crate::error::{CloudError, Result};
use crate::export::{spawn_file_export, ExportJob};
use crate::service::{CompositeHandle, CompositeRequest, ExportRequest, ImageryService, SampleRequest};

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

/// Surface reflectance bands of one acquisition.
#[derive(Debug, Clone)]
pub struct SceneBands {
    /// B2
    pub blue: Raster<f64>,
    /// B3
    pub green: Raster<f64>,
    /// B4
    pub red: Raster<f64>,
    /// B5
    pub red_edge: Raster<f64>,
    /// B8
    pub nir: Raster<f64>,
}

impl SceneBands {
    fn all(&self) -> [&Raster<f64>; 5] {
        [&self.blue, &self.green, &self.red, &self.red_edge, &self.nir]
    }
}

/// One acquisition: id, date and bands.
#[derive(Debug, Clone)]
pub struct Scene {
    id: String,
    date: NaiveDate,
    bands: SceneBands,
}

impl Scene {
    /// Fails when the bands do not share one grid.
    pub fn new(id: impl Into<String>, date: NaiveDate, bands: SceneBands) -> Result<Self> {
        let id = id.into();
        let reference = &bands.red;
        if bands.all().iter().any(|b| !reference.same_grid(*b)) {
            return Err(CloudError::Manifest(format!("bands of scene '{}' are not co-registered", id)));
        }
        Ok(Self { id, date, bands })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn footprint(&self) -> BBox {
        let (min_x, min_y, max_x, max_y) = self.bands.red.bounds();
        BBox::new(min_x, min_y, max_x, max_y)
    }

    fn feature(&self, feature: Feature, elevation: &Raster<f64>) -> Result<Raster<f64>> {
        let b = &self.bands;
        let raster = match feature {
            Feature::Ndvi => ndvi(&b.nir, &b.red)?,
            Feature::Ndre => ndre(&b.nir, &b.red_edge)?,
            Feature::Sbi => sbi(&b.blue, &b.green)?,
            Feature::Altitude => elevation.clone(),
        };
        Ok(raster)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Manifest {
    elevation: PathBuf,
    #[serde(default)]
    export_root: Option<PathBuf>,
    scenes: Vec<ManifestScene>,
}

#[derive(Debug, Deserialize)]
struct ManifestScene {
    id: String,
    date: NaiveDate,
    /// Band name (`B2`, `B3`, `B4`, `B5`, `B8`) to GeoTIFF path
    bands: HashMap<String, PathBuf>,
}

fn read_band(path: &Path) -> Result<Raster<f64>> {
    let raster = read_geotiff::<f64, _>(path)
        .map_err(|e| CloudError::Manifest(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(nodata_to_nan(raster))
}

/// Replace nodata cells with NaN so downstream maths skips them.
fn nodata_to_nan(mut raster: Raster<f64>) -> Raster<f64> {
    if let Some(nd) = raster.nodata() {
        raster
            .data_mut()
            .mapv_inplace(|v| if v == nd || (v.is_nan() && nd.is_nan()) { f64::NAN } else { v });
        raster.set_nodata(None);
    }
    raster
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

type Layers = Arc<Vec<(Feature, Raster<f64>)>>;

/// [`ImageryService`] computing composites in-process.
pub struct LocalImagery {
    scenes: Vec<Scene>,
    elevation: Raster<f64>,
    export_root: PathBuf,
    composites: Mutex<HashMap<String, Layers>>,
    counter: AtomicUsize,
}

impl LocalImagery {
    /// Fails when the elevation grid differs from any scene grid.
    pub fn new(scenes: Vec<Scene>, elevation: Raster<f64>) -> Result<Self> {
        let elevation = nodata_to_nan(elevation);
        if let Some(s) = scenes.iter().find(|s| !s.bands.red.same_grid(&elevation)) {
            return Err(CloudError::Manifest(format!(
                "scene '{}' is not on the elevation grid",
                s.id
            )));
        }
        Ok(Self {
            scenes,
            elevation,
            export_root: PathBuf::from("."),
            composites: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        })
    }

    /// Directory under which export folders are created (default: the
    /// working directory).
    pub fn with_export_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.export_root = root.into();
        self
    }

    /// Load scenes from a JSON manifest.
    ///
    /// ```json
    /// {
    ///   "elevation": "dem.tif",
    ///   "export_root": "out",
    ///   "scenes": [
    ///     {"id": "S2A_20250114", "date": "2025-01-14",
    ///      "bands": {"B2": "b2.tif", "B3": "b3.tif", "B4": "b4.tif", "B5": "b5.tif", "B8": "b8.tif"}}
    ///   ]
    /// }
    /// ```
    ///
    /// Relative paths are resolved against the manifest's directory.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CloudError::Manifest(format!("cannot read {}: {}", path.display(), e)))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| CloudError::Manifest(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let band = |scene: &ManifestScene, name: &str| -> Result<Raster<f64>> {
            let rel = scene
                .bands
                .get(name)
                .ok_or_else(|| CloudError::Manifest(format!("scene '{}' has no {} band", scene.id, name)))?;
            read_band(&base.join(rel))
        };

        let mut scenes = Vec::with_capacity(manifest.scenes.len());
        for s in &manifest.scenes {
            let bands = SceneBands {
                blue: band(s, "B2")?,
                green: band(s, "B3")?,
                red: band(s, "B4")?,
                red_edge: band(s, "B5")?,
                nir: band(s, "B8")?,
            };
            scenes.push(Scene::new(s.id.clone(), s.date, bands)?);
        }
        let elevation = read_band(&base.join(&manifest.elevation))?;
        tracing::debug!("Loaded {} scene(s) from {}", scenes.len(), path.display());

        let imagery = Self::new(scenes, elevation)?;
        Ok(match manifest.export_root {
            Some(root) => imagery.with_export_root(base.join(root)),
            None => imagery.with_export_root(base),
        })
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn layers(&self, id: &str) -> Result<Layers> {
        let store = self
            .composites
            .lock()
            .map_err(|_| CloudError::InvalidRequest("composite store is poisoned".into()))?;
        store
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::UnknownComposite(id.to_string()))
    }
}

impl ImageryService for LocalImagery {
    fn name(&self) -> &str {
        "local"
    }

    fn composite(&self, request: &CompositeRequest<'_>) -> Result<CompositeHandle> {
        let mut bands = request.features.clone();
        if request.include_elevation && !bands.contains(&Feature::Altitude) {
            bands.push(Feature::Altitude);
        }

        let region_bbox = request.region.bbox();
        let selected: Vec<&Scene> = self
            .scenes
            .iter()
            .filter(|s| request.window.contains(s.date) && s.footprint().intersects(&region_bbox))
            .collect();
        if selected.is_empty() {
            tracing::info!("No local scenes between {}", request.window);
            return Ok(CompositeHandle::empty(bands));
        }

        let mut layers = Vec::with_capacity(bands.len());
        for &feature in &bands {
            let raster = if feature == Feature::Altitude {
                self.elevation.clone()
            } else {
                let per_scene = selected
                    .iter()
                    .map(|s| s.feature(feature, &self.elevation))
                    .collect::<Result<Vec<_>>>()?;
                let refs: Vec<&Raster<f64>> = per_scene.iter().collect();
                median_composite(&refs)?
            };
            layers.push((feature, raster));
        }

        let id = self.next_id("composite");
        tracing::debug!("Composite {} from {} scene(s): {:?}", id, selected.len(), bands);
        self.composites
            .lock()
            .map_err(|_| CloudError::InvalidRequest("composite store is poisoned".into()))?
            .insert(id.clone(), Arc::new(layers));

        Ok(CompositeHandle {
            id,
            scene_count: selected.len(),
            bands,
        })
    }

    fn sample(&self, composite: &CompositeHandle, request: &SampleRequest<'_>) -> Result<Vec<SamplePoint>> {
        if composite.is_empty() {
            return Ok(Vec::new());
        }
        let layers = self.layers(&composite.id)?;
        let Some((_, grid)) = layers.first() else {
            return Ok(Vec::new());
        };

        let values_at = |row: usize, col: usize| -> Vec<f64> {
            layers.iter().map(|(_, r)| r.data()[[row, col]]).collect()
        };

        let mut candidates = pixels_in_polygon(grid, request.region.polygon());
        if request.drop_nulls {
            candidates.retain(|&(row, col)| values_at(row, col).iter().all(|v| v.is_finite()));
        }

        let chosen = choose_without_replacement(candidates.len(), request.num_pixels, request.seed);
        tracing::debug!(
            "Sampling {} of {} candidate pixel(s) from {}",
            chosen.len(),
            candidates.len(),
            composite.id
        );

        Ok(chosen
            .into_iter()
            .map(|i| {
                let (row, col) = candidates[i];
                let (x, y) = grid.cell_center(row, col);
                SamplePoint::new(x, y, values_at(row, col))
            })
            .collect())
    }

    fn release(&self, composite: &CompositeHandle) {
        match self.composites.lock() {
            Ok(mut store) => {
                if store.remove(&composite.id).is_some() {
                    tracing::debug!("Released {}", composite.id);
                }
            }
            Err(_) => tracing::warn!("composite store is poisoned; {} not released", composite.id),
        }
    }

    fn submit_export(&self, request: ExportRequest) -> Result<ExportJob> {
        let cells = request.raster.len() as u64;
        if cells > request.max_pixels {
            return Err(CloudError::ExportRejected(format!(
                "raster has {} cells, limit is {}",
                cells, request.max_pixels
            )));
        }
        spawn_file_export(
            self.next_id("export"),
            &self.export_root,
            &request.folder,
            &request.description,
            request.raster,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportStatus;
    use crate::service::Reducer;
    use approx::assert_relative_eq;
    use fieldzones_core::io::write_geotiff;
    use fieldzones_core::{GeoTransform, Region, TimeWindow, ZoneRaster, CRS};
    use std::time::Duration;

    const CELL: f64 = 0.001;

    fn band(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(10, 10, value);
        r.set_transform(GeoTransform::new(-50.0, -16.99, CELL, -CELL));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    fn scene(id: &str, date: &str, nir: f64) -> Scene {
        let bands = SceneBands {
            blue: band(0.03),
            green: band(0.04),
            red: band(0.05),
            red_edge: band(0.10),
            nir: band(nir),
        };
        Scene::new(id, NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), bands).unwrap()
    }

    fn imagery() -> LocalImagery {
        let scenes = vec![
            scene("a", "2025-01-10", 0.45),
            scene("b", "2025-02-10", 0.35),
            scene("c", "2025-03-10", 0.55),
            scene("late", "2025-05-01", 0.95),
        ];
        LocalImagery::new(scenes, band(812.0)).unwrap()
    }

    fn region() -> Region {
        // Inner 6 x 6 cells of the 10 x 10 grid
        Region::from_lon_lat(&[(-49.998, -16.998), (-49.992, -16.998), (-49.992, -16.992), (-49.998, -16.992)])
            .unwrap()
    }

    fn composite_request<'a>(region: &'a Region, end: &str) -> CompositeRequest<'a> {
        CompositeRequest {
            region,
            window: TimeWindow::parse("2025-01-01", end).unwrap(),
            collection: "sentinel-2-l2a".into(),
            features: vec![Feature::Ndvi, Feature::Ndre, Feature::Sbi],
            reducer: Reducer::Median,
            include_elevation: true,
        }
    }

    fn sample_request(region: &Region, num_pixels: usize) -> SampleRequest<'_> {
        SampleRequest {
            region,
            scale_m: 10.0,
            num_pixels,
            seed: 42,
            drop_nulls: true,
        }
    }

    #[test]
    fn composite_is_median_of_window() {
        let imagery = imagery();
        let region = region();
        let handle = imagery.composite(&composite_request(&region, "2025-03-31")).unwrap();
        assert_eq!(handle.scene_count, 3);
        assert_eq!(handle.bands, Feature::ALL.to_vec());

        let points = imagery.sample(&handle, &sample_request(&region, 1)).unwrap();
        let v = &points[0].values;
        // Median NIR is 0.45
        assert_relative_eq!(v[0], (0.45 - 0.05) / (0.45 + 0.05), epsilon = 1e-12);
        assert_relative_eq!(v[1], (0.45 - 0.10) / (0.45 + 0.10), epsilon = 1e-12);
        assert_relative_eq!(v[2], (0.03f64 * 0.03 + 0.04 * 0.04).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(v[3], 812.0);
    }

    #[test]
    fn empty_window_gives_empty_handle() {
        let imagery = imagery();
        let region = region();
        let mut request = composite_request(&region, "2025-01-05");
        request.window = TimeWindow::parse("2024-06-01", "2024-06-30").unwrap();
        let handle = imagery.composite(&request).unwrap();
        assert!(handle.is_empty());
        assert!(imagery.sample(&handle, &sample_request(&region, 10)).unwrap().is_empty());
    }

    #[test]
    fn samples_are_inside_and_capped() {
        let imagery = imagery();
        let region = region();
        let handle = imagery.composite(&composite_request(&region, "2025-03-31")).unwrap();

        let all = imagery.sample(&handle, &sample_request(&region, 5000)).unwrap();
        assert_eq!(all.len(), 36);
        assert!(all.iter().all(|p| region.contains(p.x, p.y)));

        let some = imagery.sample(&handle, &sample_request(&region, 10)).unwrap();
        assert_eq!(some.len(), 10);
        let again = imagery.sample(&handle, &sample_request(&region, 10)).unwrap();
        assert_eq!(some, again);
    }

    #[test]
    fn released_composites_leave_the_store() {
        let imagery = imagery();
        let region = region();
        let handles: Vec<_> = (0..5)
            .map(|_| imagery.composite(&composite_request(&region, "2025-03-31")).unwrap())
            .collect();
        assert_eq!(imagery.composites.lock().unwrap().len(), 5);

        for handle in &handles {
            imagery.sample(handle, &sample_request(&region, 3)).unwrap();
            imagery.release(handle);
        }
        assert!(imagery.composites.lock().unwrap().is_empty());
        assert!(matches!(
            imagery.sample(&handles[0], &sample_request(&region, 1)),
            Err(CloudError::UnknownComposite(_))
        ));
    }

    #[test]
    fn null_pixels_are_dropped() {
        let mut nir = band(0.45);
        nir.set(3, 3, f64::NAN).unwrap();
        let s = Scene::new(
            "n",
            NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            SceneBands {
                blue: band(0.03),
                green: band(0.04),
                red: band(0.05),
                red_edge: band(0.10),
                nir,
            },
        )
        .unwrap();
        let imagery = LocalImagery::new(vec![s], band(800.0)).unwrap();
        let region = region();
        let handle = imagery.composite(&composite_request(&region, "2025-03-31")).unwrap();

        let points = imagery.sample(&handle, &sample_request(&region, 5000)).unwrap();
        assert_eq!(points.len(), 35);
        assert!(points.iter().all(|p| p.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn unknown_composite_is_an_error() {
        let imagery = imagery();
        let region = region();
        let handle = CompositeHandle {
            id: "nope".into(),
            scene_count: 1,
            bands: vec![Feature::Ndvi],
        };
        assert!(matches!(
            imagery.sample(&handle, &sample_request(&region, 1)),
            Err(CloudError::UnknownComposite(_))
        ));
    }

    #[test]
    fn misaligned_bands_are_rejected() {
        let mut shifted = band(0.45);
        shifted.set_transform(GeoTransform::new(-49.0, -16.99, CELL, -CELL));
        let bands = SceneBands {
            blue: band(0.03),
            green: band(0.04),
            red: band(0.05),
            red_edge: band(0.10),
            nir: shifted,
        };
        assert!(Scene::new("x", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), bands).is_err());
    }

    #[test]
    fn export_respects_pixel_limit() {
        let dir = tempfile::tempdir().unwrap();
        let imagery = imagery().with_export_root(dir.path());
        let raster = ZoneRaster::filled(4, 4, 1);

        let request = ExportRequest {
            raster: raster.clone(),
            folder: "zone_exports".into(),
            description: "zones".into(),
            scale_m: 10.0,
            max_pixels: 10,
            region_bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
        };
        assert!(matches!(
            imagery.submit_export(request.clone()),
            Err(CloudError::ExportRejected(_))
        ));

        let mut job = imagery
            .submit_export(ExportRequest {
                max_pixels: 16,
                ..request
            })
            .unwrap();
        let status = job.wait(Duration::from_secs(10), Duration::from_millis(20)).unwrap();
        assert!(matches!(status, ExportStatus::Completed { .. }));
        assert!(dir.path().join("zone_exports/zones.tif").exists());
    }

    #[test]
    fn loads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (name, value) in [("b2", 0.03), ("b3", 0.04), ("b4", 0.05), ("b5", 0.10), ("b8", 0.45), ("dem", 812.0)] {
            write_geotiff(&band(value), root.join(format!("{}.tif", name))).unwrap();
        }
        let manifest = serde_json::json!({
            "elevation": "dem.tif",
            "scenes": [{
                "id": "S2A_20250114",
                "date": "2025-01-14",
                "bands": {"B2": "b2.tif", "B3": "b3.tif", "B4": "b4.tif", "B5": "b5.tif", "B8": "b8.tif"}
            }]
        });
        let path = root.join("scenes.json");
        std::fs::write(&path, manifest.to_string()).unwrap();

        let imagery = LocalImagery::from_manifest(&path).unwrap();
        assert_eq!(imagery.scenes().len(), 1);
        assert_eq!(imagery.scenes()[0].id(), "S2A_20250114");

        let region = region();
        let handle = imagery.composite(&composite_request(&region, "2025-03-31")).unwrap();
        assert_eq!(handle.scene_count, 1);
    }

    #[test]
    fn manifest_missing_band_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.json");
        std::fs::write(
            &path,
            r#"{"elevation":"dem.tif","scenes":[{"id":"s","date":"2025-01-01","bands":{"B2":"b2.tif"}}]}"#,
        )
        .unwrap();
        assert!(matches!(LocalImagery::from_manifest(&path), Err(CloudError::Manifest(_))));
    }
}
