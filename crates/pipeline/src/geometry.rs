//! Geometry Loader: field boundary from a zipped shapefile.
//!
//! The archive is extracted into a scratch directory that is removed before
//! the loader returns, whatever the outcome.

use std::path::Path;

use fieldzones_core::io::shapefile::read_polygons;
use fieldzones_core::io::{sibling_prj, ExtractedArchive};
use fieldzones_core::{Projection, Region, CRS};
use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// What to do when the shapefile holds more than one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonPolicy {
    /// Use the first polygon and log a warning
    #[default]
    First,
    /// Reject the upload
    RequireSingle,
}

/// A field boundary read from disk.
#[derive(Debug, Clone)]
pub struct LoadedBoundary {
    /// Boundary in WGS84 lon/lat
    pub region: Region,
    /// CRS the shapefile was stored in
    pub source_crs: CRS,
    /// Polygons found in the shapefile
    pub polygon_count: usize,
}

/// Load the field boundary from a zip archive containing a shapefile.
pub fn load_region_from_archive(path: &Path, policy: PolygonPolicy) -> Result<LoadedBoundary> {
    let archive = ExtractedArchive::extract(path).map_err(|e| PipelineError::InvalidArchive(e.to_string()))?;

    let shp = archive
        .first_shapefile()
        .ok_or_else(|| PipelineError::NoBoundary(format!("{} contains no .shp file", path.display())))?;

    let shapefiles = archive
        .files()
        .iter()
        .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("shp")))
        .count();
    if shapefiles > 1 {
        tracing::warn!("Archive holds {} shapefiles, using {}", shapefiles, display_name(shp));
    }

    load_region_from_shapefile(shp, policy)
}

/// Load the field boundary from an already extracted `.shp`.
pub fn load_region_from_shapefile(shp: &Path, policy: PolygonPolicy) -> Result<LoadedBoundary> {
    let source_crs = read_source_crs(shp)?;
    let projection = source_crs.projection()?;

    let polygons = read_polygons(shp)?;
    let polygon_count = polygons.len();
    let first = match (polygons.into_iter().next(), policy) {
        (None, _) => {
            return Err(PipelineError::NoBoundary(format!(
                "{} has no polygons",
                display_name(shp)
            )))
        }
        (Some(_), PolygonPolicy::RequireSingle) if polygon_count > 1 => {
            return Err(PipelineError::MultiplePolygons(polygon_count))
        }
        (Some(p), _) => p,
    };
    if polygon_count > 1 {
        tracing::warn!(
            "{} holds {} polygons, using the first",
            display_name(shp),
            polygon_count
        );
    }
    if !first.interiors().is_empty() {
        tracing::debug!("Dropping {} hole(s) from the boundary", first.interiors().len());
    }

    let exterior = reproject_ring(first.exterior(), &projection);
    let region = Region::new(Polygon::new(exterior, vec![]))
        .map_err(|e| PipelineError::InvalidBoundary(e.to_string()))?;

    let bbox = region.bbox();
    tracing::info!(
        "Boundary loaded from {} ({}): [{:.6}, {:.6}, {:.6}, {:.6}]",
        display_name(shp),
        source_crs,
        bbox.min_x,
        bbox.min_y,
        bbox.max_x,
        bbox.max_y
    );

    Ok(LoadedBoundary {
        region,
        source_crs,
        polygon_count,
    })
}

/// CRS from the sibling `.prj`, or WGS84 when there is none.
fn read_source_crs(shp: &Path) -> Result<CRS> {
    match sibling_prj(shp) {
        Some(prj) => {
            let wkt = std::fs::read_to_string(&prj).map_err(fieldzones_core::Error::from)?;
            Ok(CRS::from_wkt(wkt.trim()))
        }
        None => {
            tracing::warn!("{} has no .prj, assuming WGS84", display_name(shp));
            Ok(CRS::wgs84())
        }
    }
}

fn reproject_ring(ring: &LineString<f64>, projection: &Projection) -> LineString<f64> {
    ring.coords()
        .map(|c| {
            let (x, y) = projection.to_wgs84(c.x, c.y);
            Coord { x, y }
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use fieldzones_core::crs::TransverseMercator;
    use fieldzones_core::io::shapefile::encode_polygons;
    use geo::polygon;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const UTM_22S_WKT: &str = r#"PROJCS["SIRGAS 2000 / UTM zone 22S",GEOGCS["SIRGAS 2000",DATUM["Sistema_de_Referencia_Geocentrico_para_las_AmericaS_2000",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",-51],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",10000000],UNIT["metre",1]]"#;

    fn field() -> Polygon<f64> {
        // Clockwise exterior
        polygon![
            (x: -50.0, y: -17.0),
            (x: -50.0, y: -16.99),
            (x: -49.99, y: -16.99),
            (x: -49.99, y: -17.0),
            (x: -50.0, y: -17.0),
        ]
    }

    fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn loads_geographic_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("field.zip");
        write_zip(
            &zip,
            &[
                ("field.shp", encode_polygons(&[field()]).unwrap()),
                ("field.prj", br#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.0174532925199433]]"#.to_vec()),
            ],
        );

        let loaded = load_region_from_archive(&zip, PolygonPolicy::First).unwrap();
        assert_eq!(loaded.polygon_count, 1);
        let bbox = loaded.region.bbox();
        assert_eq!(bbox.to_array(), [-50.0, -17.0, -49.99, -16.99]);
    }

    #[test]
    fn reprojects_utm_boundary() {
        let tm = TransverseMercator::utm(22, false);
        let projected: Vec<Coord<f64>> = field()
            .exterior()
            .coords()
            .map(|c| {
                let (x, y) = tm.forward(c.x, c.y);
                Coord { x, y }
            })
            .collect();
        let poly = Polygon::new(LineString::new(projected), vec![]);

        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("utm.zip");
        write_zip(
            &zip,
            &[
                ("Boundary/FIELD.SHP", encode_polygons(&[poly]).unwrap()),
                ("Boundary/FIELD.prj", UTM_22S_WKT.as_bytes().to_vec()),
            ],
        );

        let loaded = load_region_from_archive(&zip, PolygonPolicy::First).unwrap();
        let bbox = loaded.region.bbox();
        approx::assert_relative_eq!(bbox.min_x, -50.0, epsilon = 1e-7);
        approx::assert_relative_eq!(bbox.max_y, -16.99, epsilon = 1e-7);
        for c in loaded.region.exterior() {
            assert!((-180.0..=180.0).contains(&c.x) && (-90.0..=90.0).contains(&c.y));
        }
    }

    #[test]
    fn missing_prj_assumes_wgs84() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("noprj.zip");
        write_zip(&zip, &[("a.shp", encode_polygons(&[field()]).unwrap())]);

        let loaded = load_region_from_archive(&zip, PolygonPolicy::First).unwrap();
        assert_eq!(loaded.source_crs, CRS::wgs84());
    }

    #[test]
    fn projected_coordinates_without_prj_fail_bounds_check() {
        let tm = TransverseMercator::utm(22, false);
        let projected: Vec<Coord<f64>> = field()
            .exterior()
            .coords()
            .map(|c| {
                let (x, y) = tm.forward(c.x, c.y);
                Coord { x, y }
            })
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("bad.zip");
        let poly = Polygon::new(LineString::new(projected), vec![]);
        write_zip(&zip, &[("a.shp", encode_polygons(&[poly]).unwrap())]);

        let err = load_region_from_archive(&zip, PolygonPolicy::First).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBoundary(_)));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn archive_without_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("empty.zip");
        write_zip(&zip, &[("readme.txt", b"hello".to_vec())]);

        let err = load_region_from_archive(&zip, PolygonPolicy::First).unwrap_err();
        assert!(matches!(err, PipelineError::NoBoundary(_)));
    }

    #[test]
    fn not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.zip");
        std::fs::write(&path, b"not a zip").unwrap();

        let err = load_region_from_archive(&path, PolygonPolicy::First).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArchive(_)));
    }

    #[test]
    fn polygon_policy() {
        let second = polygon![
            (x: -49.0, y: -17.0),
            (x: -49.0, y: -16.99),
            (x: -48.99, y: -16.99),
            (x: -48.99, y: -17.0),
            (x: -49.0, y: -17.0),
        ];
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("two.zip");
        write_zip(&zip, &[("two.shp", encode_polygons(&[field(), second]).unwrap())]);

        let loaded = load_region_from_archive(&zip, PolygonPolicy::First).unwrap();
        assert_eq!(loaded.polygon_count, 2);
        assert_eq!(loaded.region.bbox().min_x, -50.0);

        let err = load_region_from_archive(&zip, PolygonPolicy::RequireSingle).unwrap_err();
        assert!(matches!(err, PipelineError::MultiplePolygons(2)));
    }
}
