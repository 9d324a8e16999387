//! Coordinate Reference System handling

mod projection;
mod wkt;

pub use projection::{Projection, TransverseMercator};
pub use wkt::{parse_wkt, WktNode, WktValue};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (as found in a `.prj` sidecar)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The EPSG code is taken from the top-level `AUTHORITY`/`ID` clause when
    /// the WKT carries one (ESRI-flavoured `.prj` files usually do not).
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = parse_wkt(&wkt).ok().and_then(|node| node.epsg());
        Self {
            wkt: Some(wkt),
            epsg,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Resolve this CRS into a projection that can be inverted to WGS84.
    pub fn projection(&self) -> Result<Projection> {
        if let Some(wkt) = &self.wkt {
            let root = parse_wkt(wkt)?;
            if let Some(projection) = Projection::from_wkt(&root) {
                return Ok(projection);
            }
        }
        if let Some(projection) = self.epsg.and_then(Projection::from_epsg) {
            return Ok(projection);
        }
        Err(Error::UnsupportedCrs(self.identifier()))
    }

    /// Whether this CRS is geographic WGS84-compatible longitude/latitude
    pub fn is_geographic(&self) -> bool {
        matches!(self.projection(), Ok(Projection::Geographic))
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(name) = self
            .wkt
            .as_deref()
            .and_then(|w| parse_wkt(w).ok())
            .and_then(|node| node.name().map(str::to_string))
        {
            return name;
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
