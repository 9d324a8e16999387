//! Rasterizing labelled sample points onto a geographic grid

use fieldzones_core::raster::GeoTransform;
use fieldzones_core::{BBox, Error, Result, ZoneRaster, CRS, ZONE_NODATA};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Cell size in degrees `(dx, dy)` for a nominal `scale_m` metres at
/// latitude `lat_deg`.
pub fn geographic_cell_size(scale_m: f64, lat_deg: f64) -> (f64, f64) {
    let dy = scale_m / METERS_PER_DEGREE;
    let cos = lat_deg.to_radians().cos().abs().max(1e-12);
    (dy / cos, dy)
}

/// Geographic grid covering a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl ZoneGrid {
    /// Grid anchored at the bbox's upper-left corner with `scale_m` cells
    /// measured at the bbox centre latitude. At least one row and column.
    pub fn covering(bbox: &BBox, scale_m: f64) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale_m",
                value: scale_m.to_string(),
                reason: "must be a positive number of metres".into(),
            });
        }
        let (_, center_lat) = bbox.center();
        let (dx, dy) = geographic_cell_size(scale_m, center_lat);

        let cols = ((bbox.width() / dx).ceil() as usize).max(1);
        let rows = ((bbox.height() / dy).ceil() as usize).max(1);

        Ok(Self {
            transform: GeoTransform::new(bbox.min_x, bbox.max_y, dx, -dy),
            rows,
            cols,
        })
    }

    /// Saturates instead of overflowing on absurd grids.
    pub fn cell_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Cell holding `(x, y)`. Points on the far bbox edges fall in the last
    /// row/column; points outside the grid give `None`.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let col = (col.floor() as usize).min(self.cols - 1);
        let row = (row.floor() as usize).min(self.rows - 1);
        let (max_x, min_y) = self.transform.pixel_to_geo_corner(self.cols, self.rows);
        (x <= max_x && y >= min_y).then_some((row, col))
    }
}

/// Burn point labels into a zone raster.
///
/// Points are visited in order and each cell keeps the **first** label that
/// lands in it. Cells without a point are [`ZONE_NODATA`].
pub fn rasterize_first_match(grid: &ZoneGrid, points: &[(f64, f64)], labels: &[usize]) -> Result<ZoneRaster> {
    if points.len() != labels.len() {
        return Err(Error::InvalidParameter {
            name: "labels",
            value: labels.len().to_string(),
            reason: format!("expected one label per point ({})", points.len()),
        });
    }

    let mut raster = ZoneRaster::filled(grid.rows, grid.cols, ZONE_NODATA);
    raster.set_transform(grid.transform);
    raster.set_crs(Some(CRS::wgs84()));
    raster.set_nodata(Some(ZONE_NODATA));

    let mut outside = 0usize;
    for (&(x, y), &label) in points.iter().zip(labels) {
        let label = u8::try_from(label)
            .ok()
            .filter(|&l| l != ZONE_NODATA)
            .ok_or_else(|| Error::InvalidParameter {
                name: "labels",
                value: label.to_string(),
                reason: format!("zone labels must be below {}", ZONE_NODATA),
            })?;

        match grid.cell_of(x, y) {
            Some((row, col)) => {
                let cell = &mut raster.data_mut()[[row, col]];
                if *cell == ZONE_NODATA {
                    *cell = label;
                }
            }
            None => outside += 1,
        }
    }

    if outside > 0 {
        tracing::debug!("{} point(s) fell outside the zone grid", outside);
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn longitude_cells_widen_with_latitude() {
        let (dx, dy) = geographic_cell_size(10.0, 0.0);
        assert_relative_eq!(dx, dy);
        assert_relative_eq!(dy, 10.0 / 111_320.0);

        let (dx60, _) = geographic_cell_size(10.0, 60.0);
        assert_relative_eq!(dx60, 2.0 * dy, epsilon = 1e-12);
    }

    #[test]
    fn grid_covers_bbox() {
        let bbox = BBox::new(-50.0, -17.0, -49.99, -16.99);
        let grid = ZoneGrid::covering(&bbox, 10.0).unwrap();
        let (dx, dy) = geographic_cell_size(10.0, -16.995);

        assert_eq!(grid.cols, (0.01 / dx).ceil() as usize);
        assert_eq!(grid.rows, (0.01 / dy).ceil() as usize);
        assert_eq!(grid.transform.origin_x, -50.0);
        assert_eq!(grid.transform.origin_y, -16.99);
    }

    #[test]
    fn degenerate_bbox_gets_one_cell() {
        let grid = ZoneGrid::covering(&BBox::new(1.0, 1.0, 1.0, 1.0), 10.0).unwrap();
        assert_eq!((grid.rows, grid.cols), (1, 1));
        assert!(ZoneGrid::covering(&BBox::new(0.0, 0.0, 1.0, 1.0), 0.0).is_err());
    }

    #[test]
    fn first_label_wins() {
        let bbox = BBox::new(0.0, 0.0, 0.001, 0.001);
        let grid = ZoneGrid::covering(&bbox, 1000.0).unwrap();
        assert_eq!(grid.cell_count(), 1);

        let points = [(0.0005, 0.0005), (0.0002, 0.0008)];
        let raster = rasterize_first_match(&grid, &points, &[2, 0]).unwrap();
        assert_eq!(raster.get(0, 0).unwrap(), 2);
        assert_eq!(raster.nodata(), Some(ZONE_NODATA));
    }

    #[test]
    fn empty_cells_are_nodata_and_edges_clamp() {
        let bbox = BBox::new(0.0, 0.0, 4.0 * 10.0 / METERS_PER_DEGREE, 10.0 / METERS_PER_DEGREE);
        let grid = ZoneGrid::covering(&bbox, 10.0).unwrap();
        assert_eq!(grid.rows, 1);

        let raster = rasterize_first_match(&grid, &[(bbox.max_x, bbox.min_y)], &[1]).unwrap();
        let last = grid.cols - 1;
        assert_eq!(raster.get(0, last).unwrap(), 1);
        assert_eq!(raster.get(0, 0).unwrap(), ZONE_NODATA);
        assert!(rasterize_first_match(&grid, &[(9.0, 9.0)], &[0]).is_ok());
        assert!(rasterize_first_match(&grid, &[(0.0, 0.0)], &[]).is_err());
    }
}
