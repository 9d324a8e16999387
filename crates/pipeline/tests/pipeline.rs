//! End-to-end zoning runs against the in-process imagery backend.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use fieldzones_cloud::{ExportStatus, LocalImagery, Scene, SceneBands};
use fieldzones_core::io::read_geotiff;
use fieldzones_core::io::shapefile::encode_polygons;
use fieldzones_core::{GeoTransform, Raster, Region, TimeWindow, CRS, ZONE_NODATA};
use fieldzones_pipeline::{
    zone_layer, ErrorKind, PipelineConfig, PipelineError, PolygonPolicy, RunParams, Stage, ZonePipeline,
};
use geo::polygon;
use zip::write::SimpleFileOptions;

const ORIGIN_X: f64 = -50.0;
const ORIGIN_Y: f64 = -16.998;
const CELL: f64 = 0.0001;
const SIZE: usize = 20;

// ---------------------------------------------------------------------------
// Synthetic scenes: a vegetated field west of column 10, bare soil east
// ---------------------------------------------------------------------------

fn grid_with(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let data = (0..SIZE * SIZE).map(|i| f(i / SIZE, i % SIZE)).collect();
    let mut r = Raster::from_vec(data, SIZE, SIZE).unwrap();
    r.set_transform(GeoTransform::new(ORIGIN_X, ORIGIN_Y, CELL, -CELL));
    r.set_crs(Some(CRS::wgs84()));
    r
}

fn two_field_scene(id: &str, date: &str, gain: f64) -> Scene {
    let west = |c: usize| c < SIZE / 2;
    let jitter = |r: usize, c: usize| 0.0025 * ((r * 7 + c * 3) % 5) as f64;

    let bands = SceneBands {
        blue: grid_with(|_, c| if west(c) { 0.03 } else { 0.15 }),
        green: grid_with(|_, c| if west(c) { 0.05 } else { 0.18 }),
        red: grid_with(|r, c| if west(c) { 0.04 + jitter(r, c) } else { 0.20 + jitter(r, c) }),
        red_edge: grid_with(|_, c| if west(c) { 0.15 } else { 0.22 }),
        nir: grid_with(|_, c| gain * if west(c) { 0.45 } else { 0.25 }),
    };
    Scene::new(id, NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), bands).unwrap()
}

fn uniform_scene(id: &str, date: &str) -> Scene {
    let bands = SceneBands {
        blue: grid_with(|_, _| 0.05),
        green: grid_with(|_, _| 0.06),
        red: grid_with(|_, _| 0.08),
        red_edge: grid_with(|_, _| 0.12),
        nir: grid_with(|_, _| 0.40),
    };
    Scene::new(id, NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), bands).unwrap()
}

fn elevation() -> Raster<f64> {
    grid_with(|_, c| if c < SIZE / 2 { 800.0 } else { 800.5 })
}

fn two_field_imagery(export_root: &Path) -> LocalImagery {
    let scenes = vec![
        two_field_scene("S2A_20250112", "2025-01-12", 1.00),
        two_field_scene("S2B_20250207", "2025-02-07", 1.02),
        two_field_scene("S2A_20250314", "2025-03-14", 0.98),
        two_field_scene("S2B_20250510", "2025-05-10", 1.50),
    ];
    LocalImagery::new(scenes, elevation())
        .unwrap()
        .with_export_root(export_root)
}

/// 10 x 10 cell centres inside, columns 5..15 and rows 5..15.
fn field_polygon() -> geo::Polygon<f64> {
    polygon![
        (x: -49.9995, y: -16.9995),
        (x: -49.9995, y: -16.9985),
        (x: -49.9985, y: -16.9985),
        (x: -49.9985, y: -16.9995),
        (x: -49.9995, y: -16.9995),
    ]
}

fn field() -> Region {
    Region::new(field_polygon()).unwrap()
}

fn params(zones: usize) -> RunParams {
    RunParams {
        zones,
        ..Default::default()
    }
}

fn write_boundary_zip(path: &Path) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("talhao/talhao.shp", options).unwrap();
    zip.write_all(&encode_polygons(&[field_polygon()]).unwrap()).unwrap();
    zip.start_file("talhao/talhao.prj", options).unwrap();
    zip.write_all(br#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.0174532925199433]]"#)
        .unwrap();
    zip.finish().unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn two_fields_become_two_zones() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let outcome = pipeline.run(&field(), &params(2)).unwrap();
    assert_eq!(outcome.samples.len(), 100);

    let labels = outcome.assignment.labels();
    let west_label = labels[outcome.samples.points().iter().position(|p| p.x < -49.999).unwrap()];
    for (p, &label) in outcome.samples.points().iter().zip(labels) {
        if p.x < -49.999 {
            assert_eq!(label, west_label);
        } else {
            assert_ne!(label, west_label);
        }
    }
    assert_eq!(outcome.assignment.counts(), vec![50, 50]);
    assert_eq!(outcome.report.zones, 2);
    assert_eq!(outcome.report.sample_count, 100);
}

#[test]
fn scenes_outside_window_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let outcome = pipeline.run(&field(), &params(2)).unwrap();
    // Median NIR gain over Jan-Mar is 1.00, so the west NDVI mean stays
    // below what the May scene (gain 1.5) would give.
    let west = outcome
        .report
        .zone_summaries
        .iter()
        .find(|z| z.means[0] > 0.5)
        .unwrap();
    assert!(west.means[0] < 0.84, "west NDVI {}", west.means[0]);
}

#[test]
fn samples_respect_ceiling_and_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let config = PipelineConfig {
        sample_count: 30,
        ..Default::default()
    };
    let pipeline = ZonePipeline::new(&imagery, config).unwrap();

    let outcome = pipeline.run(&field(), &params(3)).unwrap();
    assert_eq!(outcome.samples.len(), 30);
    let bbox = field().bbox();
    assert!(outcome
        .samples
        .points()
        .iter()
        .all(|p| bbox.contains_point(p.x, p.y)));
    assert!(outcome.assignment.labels().iter().all(|&l| l < 3));
}

#[test]
fn runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let a = pipeline.run(&field(), &params(4)).unwrap();
    let b = pipeline.run(&field(), &params(4)).unwrap();

    assert_eq!(a.samples, b.samples);
    assert_eq!(a.assignment, b.assignment);
    assert_eq!(a.report, b.report);
    assert_eq!(a.report.render_lines(), b.report.render_lines());
}

#[test]
fn zone_count_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    for zones in [0, 1, 8] {
        let err = pipeline.run(&field(), &params(zones)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter, "zones = {}", zones);
    }
    assert!(!pipeline.guard().is_busy());
}

#[test]
fn more_zones_than_distinct_samples() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = LocalImagery::new(vec![uniform_scene("flat", "2025-02-01")], grid_with(|_, _| 812.0))
        .unwrap()
        .with_export_root(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let err = pipeline.run(&field(), &params(2)).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameter { name: "zones", .. }));
}

#[test]
fn empty_window_is_upstream_empty() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let run = RunParams {
        window: TimeWindow::parse("2024-06-01", "2024-08-31").unwrap(),
        zones: 3,
    };
    let err = pipeline.run(&field(), &run).unwrap_err();
    assert!(matches!(err, PipelineError::NoImagery(_)));
    assert_eq!(err.kind(), ErrorKind::UpstreamEmpty);
}

#[test]
fn field_outside_scenes_has_no_imagery() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let far = Region::from_lon_lat(&[(10.0, 10.0), (10.01, 10.0), (10.01, 10.01), (10.0, 10.01)]).unwrap();
    let err = pipeline.run(&far, &params(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamEmpty);
}

#[test]
fn second_concurrent_run_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let permit = pipeline.guard().try_acquire().unwrap();
    let err = pipeline.run(&field(), &params(2)).unwrap_err();
    assert!(matches!(err, PipelineError::Busy));

    drop(permit);
    assert!(pipeline.run(&field(), &params(2)).is_ok());
}

#[test]
fn stages_are_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let imagery = two_field_imagery(dir.path());
    let pipeline = ZonePipeline::new(&imagery, PipelineConfig::default()).unwrap();

    let mut stages = Vec::new();
    pipeline
        .run_with_progress(&field(), &params(2), &mut |s| stages.push(s))
        .unwrap();
    assert_eq!(
        stages,
        vec![Stage::Sampling, Stage::Classifying, Stage::Exporting, Stage::Reporting]
    );
}

#[test]
fn archive_to_exported_raster() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("talhao.zip");
    write_boundary_zip(&zip_path);

    let imagery = two_field_imagery(dir.path());
    let config = PipelineConfig {
        polygon_policy: PolygonPolicy::RequireSingle,
        export_description: "zones_test".into(),
        ..Default::default()
    };
    let pipeline = ZonePipeline::new(&imagery, config).unwrap();

    let boundary = pipeline.load_boundary(&zip_path).unwrap();
    assert_eq!(boundary.polygon_count, 1);
    for c in boundary.region.exterior() {
        assert!((-180.0..=180.0).contains(&c.x) && (-90.0..=90.0).contains(&c.y));
    }

    let mut outcome = pipeline.run(&boundary.region, &params(2)).unwrap();
    assert_eq!(outcome.export.job.destination(), "zone_exports/zones_test");

    let status = outcome
        .export
        .job
        .wait(Duration::from_secs(10), Duration::from_millis(20))
        .unwrap();
    let location = match status {
        ExportStatus::Completed { location } => location,
        other => panic!("export did not complete: {:?}", other),
    };

    let raster: Raster<f64> = read_geotiff(&location).unwrap();
    assert_eq!(raster.shape(), (outcome.export.rows, outcome.export.cols));
    let labelled = raster
        .data()
        .iter()
        .filter(|&&v| v != ZONE_NODATA as f64)
        .count();
    assert_eq!(labelled, outcome.export.labelled_cells);
    assert!(labelled > 0 && labelled <= outcome.samples.len());

    let layer = zone_layer(&outcome.samples, &outcome.assignment);
    assert_eq!(layer["features"].as_array().unwrap().len(), outcome.samples.len());

    let pdf = dir.path().join("report.pdf");
    outcome.report.write_pdf(&pdf).unwrap();
    assert!(pdf.exists());
}
