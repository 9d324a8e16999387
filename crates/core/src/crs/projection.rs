//! Pure-Rust projections back to WGS84 longitude/latitude.
//!
//! Transverse Mercator follows Snyder 1987 (USGS Prof. Paper 1395) on the
//! WGS84 ellipsoid; GRS80-based datums such as SIRGAS 2000 differ from it by
//! well under a metre and are treated as identical. Web Mercator uses the
//! spherical formulas of EPSG:3857.

use super::wkt::WktNode;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A projection that can be inverted to geographic WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees (WGS84, SIRGAS 2000, NAD83, ...)
    Geographic,
    TransverseMercator(TransverseMercator),
    /// Spherical "Pseudo-Mercator" (EPSG:3857)
    WebMercator,
}

/// Transverse Mercator parameters (angles in degrees, offsets in metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub central_meridian: f64,
    pub latitude_of_origin: f64,
    pub scale_factor: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    /// Metres per projected unit (1.0 for metre-based systems)
    pub linear_unit: f64,
}

impl Projection {
    /// Projection for a known EPSG code.
    ///
    /// - 4326, 4674, 4618, 4269, 4258 → geographic
    /// - 326xx / 327xx → WGS84 UTM north / south
    /// - 31965–31976 / 31978–31985 → SIRGAS 2000 UTM 11N–22N / 18S–25S
    /// - 3857, 900913 → Web Mercator
    pub fn from_epsg(code: u32) -> Option<Self> {
        let utm = |zone: u32, north: bool| {
            Some(Self::TransverseMercator(TransverseMercator::utm(zone, north)))
        };
        match code {
            4326 | 4674 | 4618 | 4269 | 4258 => Some(Self::Geographic),
            3857 | 900913 => Some(Self::WebMercator),
            32601..=32660 => utm(code - 32600, true),
            32701..=32760 => utm(code - 32700, false),
            31965..=31976 => utm(code - 31965 + 11, true),
            31978..=31985 => utm(code - 31978 + 18, false),
            _ => None,
        }
    }

    /// Interpret a parsed WKT root clause.
    ///
    /// Returns `None` when the projection method is not recognised; callers
    /// may still fall back to an EPSG code.
    pub(crate) fn from_wkt(root: &WktNode) -> Option<Self> {
        let keyword = root.keyword.to_ascii_uppercase();
        match keyword.as_str() {
            "GEOGCS" | "GEOGCRS" | "GEODCRS" | "GEOGRAPHICCRS" => return Some(Self::Geographic),
            "PROJCS" | "PROJCRS" | "PROJECTEDCRS" => {}
            _ => return root.epsg().and_then(Self::from_epsg),
        }

        let method = root
            .child("PROJECTION")
            .or_else(|| root.child("CONVERSION").and_then(|c| c.child("METHOD")))
            .and_then(WktNode::name)
            .map(normalize_name)
            .unwrap_or_default();
        let name = root.name().map(normalize_name).unwrap_or_default();

        if method.contains("pseudo_mercator")
            || method.contains("mercator_auxiliary_sphere")
            || name.contains("pseudo_mercator")
            || name.contains("web_mercator")
        {
            return Some(Self::WebMercator);
        }

        if method == "transverse_mercator" {
            let params = root.child("CONVERSION").unwrap_or(root);
            let param = |names: &[&str], default: f64| -> f64 {
                params
                    .children("PARAMETER")
                    .find(|p| {
                        p.name()
                            .map(normalize_name)
                            .is_some_and(|n| names.contains(&n.as_str()))
                    })
                    .and_then(|p| p.number(0))
                    .unwrap_or(default)
            };
            let linear_unit = root
                .child("UNIT")
                .or_else(|| root.child("LENGTHUNIT"))
                .and_then(|u| u.number(0))
                .unwrap_or(1.0);

            return Some(Self::TransverseMercator(TransverseMercator {
                central_meridian: param(
                    &["central_meridian", "longitude_of_natural_origin", "longitude_of_origin"],
                    0.0,
                ),
                latitude_of_origin: param(&["latitude_of_origin", "latitude_of_natural_origin"], 0.0),
                scale_factor: param(&["scale_factor", "scale_factor_at_natural_origin"], 1.0),
                false_easting: param(&["false_easting"], 0.0) * linear_unit,
                false_northing: param(&["false_northing"], 0.0) * linear_unit,
                linear_unit,
            }));
        }

        root.epsg().and_then(Self::from_epsg)
    }

    /// Convert projected `(x, y)` to WGS84 `(longitude, latitude)` in degrees.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Geographic => (x, y),
            Self::TransverseMercator(tm) => tm.inverse(x, y),
            Self::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                (lon, lat)
            }
        }
    }
}

impl TransverseMercator {
    /// Standard UTM parameters for a zone (1..=60) and hemisphere.
    pub fn utm(zone: u32, north: bool) -> Self {
        Self {
            central_meridian: (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0,
            latitude_of_origin: 0.0,
            scale_factor: UTM_K0,
            false_easting: UTM_FALSE_EASTING,
            false_northing: if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH },
            linear_unit: 1.0,
        }
    }

    /// Project WGS84 (longitude, latitude) in degrees to (easting, northing)
    /// in projected units (Snyder eqs. 8-9, 8-10).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();
        let lon0 = self.central_meridian.to_radians();
        let k0 = self.scale_factor;

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = E_PRIME2 * cos_lat * cos_lat;
        let a_coeff = cos_lat * (lon - lon0);

        let m = meridional_arc(lat);
        let m0 = meridional_arc(self.latitude_of_origin.to_radians());

        let a2 = a_coeff * a_coeff;
        let a4 = a2 * a2;
        let a6 = a4 * a2;

        let easting = k0 * n
            * (a_coeff
                + (1.0 - t + c) * a2 * a_coeff / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
            + self.false_easting;

        let northing = k0
            * (m - m0
                + n * tan_lat
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0))
            + self.false_northing;

        (easting / self.linear_unit, northing / self.linear_unit)
    }

    /// Inverse projection to WGS84 (longitude, latitude) in degrees
    /// (Snyder eqs. 8-12 to 8-18 with footpoint latitude 3-26).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let k0 = self.scale_factor;
        let x = x * self.linear_unit - self.false_easting;
        let y = y * self.linear_unit - self.false_northing;

        let m = meridional_arc(self.latitude_of_origin.to_radians()) + y / k0;
        let e4 = E2 * E2;
        let e6 = e4 * E2;
        let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        let sqrt_1me2 = (1.0 - E2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
        let e1_2 = e1 * e1;
        let e1_3 = e1_2 * e1;
        let e1_4 = e1_3 * e1;

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

        let sin_phi1 = phi1.sin();
        let cos_phi1 = phi1.cos();
        let tan_phi1 = phi1.tan();

        let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
        let n1 = A / denom.sqrt();
        let r1 = A * (1.0 - E2) / denom.powf(1.5);
        let d = x / (n1 * k0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);

        let lon = self.central_meridian.to_radians()
            + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                    * d5
                    / 120.0)
                / cos_phi1;

        (lon.to_degrees(), lat.to_degrees())
    }
}

/// Meridional arc from equator to latitude `lat` (radians). Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

/// Lower-case a WKT name and unify separators (`"Transverse Mercator"` and
/// `"Transverse_Mercator"` compare equal).
fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::parse_wkt;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    // Reference values from pyproj (PROJ 9.x):
    //   Transformer.from_crs(4326, 32630, always_xy=True).transform(-3.7037, 40.4168)
    //   → (440298.94, 4474257.31)
    #[test]
    fn madrid_forward_utm30n() {
        let (e, n) = TransverseMercator::utm(30, true).forward(-3.7037, 40.4168);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }

    //   Transformer.from_crs(4326, 32721, always_xy=True).transform(-58.3816, -34.6037)
    //   → (373317.50, 6170036.17)
    #[test]
    fn buenos_aires_inverse_utm21s() {
        let (lon, lat) = TransverseMercator::utm(21, false).inverse(373_317.50, 6_170_036.17);
        assert_close(lon, -58.3816, 2e-5, "longitude");
        assert_close(lat, -34.6037, 2e-5, "latitude");
    }

    #[test]
    fn inverse_roundtrips_forward_in_brazil() {
        // Rio Verde (GO), SIRGAS 2000 / UTM 22S
        let tm = TransverseMercator::utm(22, false);
        for &(lon, lat) in &[(-50.93, -17.79), (-51.0, -0.5), (-53.9, -24.1)] {
            let (e, n) = tm.forward(lon, lat);
            let (lon2, lat2) = tm.inverse(e, n);
            assert_close(lon2, lon, 1e-6, "longitude");
            assert_close(lat2, lat, 1e-6, "latitude");
        }
    }

    #[test]
    fn equator_central_meridian() {
        let (lon, lat) = TransverseMercator::utm(30, true).inverse(500_000.0, 0.0);
        assert_close(lon, -3.0, 1e-9, "longitude at CM");
        assert_close(lat, 0.0, 1e-9, "latitude at equator");
    }

    #[test]
    fn web_mercator_inverse() {
        let p = Projection::WebMercator;
        let (lon, lat) = p.to_wgs84(0.0, 0.0);
        assert_close(lon, 0.0, 1e-12, "origin lon");
        assert_close(lat, 0.0, 1e-12, "origin lat");

        // -47.93, -15.78 (Brasília) → (-5335543.19, -1779259.49)
        let (lon, lat) = p.to_wgs84(-5_335_543.19, -1_779_259.49);
        assert_close(lon, -47.93, 1e-4, "lon");
        assert_close(lat, -15.78, 1e-4, "lat");
    }

    #[test]
    fn epsg_lookup() {
        assert_eq!(Projection::from_epsg(4326), Some(Projection::Geographic));
        assert_eq!(Projection::from_epsg(4674), Some(Projection::Geographic));
        assert_eq!(
            Projection::from_epsg(31982),
            Some(Projection::TransverseMercator(TransverseMercator::utm(22, false)))
        );
        assert_eq!(
            Projection::from_epsg(32723),
            Some(Projection::TransverseMercator(TransverseMercator::utm(23, false)))
        );
        assert_eq!(Projection::from_epsg(32600), None);
        assert_eq!(Projection::from_epsg(2154), None);
    }

    #[test]
    fn pseudo_mercator_wkt() {
        let wkt = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#;
        let root = parse_wkt(wkt).unwrap();
        assert_eq!(Projection::from_wkt(&root), Some(Projection::WebMercator));
    }

    #[test]
    fn unknown_projection_falls_back_to_authority() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 23S",GEOGCS["WGS 84"],PROJECTION["Some_Exotic_Method"],UNIT["metre",1],AUTHORITY["EPSG","32723"]]"#;
        let root = parse_wkt(wkt).unwrap();
        assert_eq!(
            Projection::from_wkt(&root),
            Some(Projection::TransverseMercator(TransverseMercator::utm(23, false)))
        );
    }
}
