//! Pixel selection inside a polygon
//!
//! Candidates are the grid cells whose centre lies strictly inside the
//! polygon, in raster (row-major) order. When more candidates exist than
//! requested, a seeded uniform subset is drawn without replacement and
//! returned in raster order.

use crate::maybe_rayon::*;
use fieldzones_core::raster::{Raster, RasterElement};
use geo::{BoundingRect, Contains, Point, Polygon};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Cells `(row, col)` of `grid` whose centre is inside `polygon`.
pub fn pixels_in_polygon<T: RasterElement>(grid: &Raster<T>, polygon: &Polygon<f64>) -> Vec<(usize, usize)> {
    let Some(rect) = polygon.bounding_rect() else {
        return Vec::new();
    };
    let (rows, cols) = grid.shape();

    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .filter_map(|col| {
                    let (x, y) = grid.cell_center(row, col);
                    let in_rect = x >= rect.min().x
                        && x <= rect.max().x
                        && y >= rect.min().y
                        && y <= rect.max().y;
                    (in_rect && polygon.contains(&Point::new(x, y))).then_some((row, col))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// `amount` distinct indices from `0..n`, ascending.
///
/// Returns all of `0..n` when `amount >= n`. The same `(n, amount, seed)`
/// always gives the same subset.
pub fn choose_without_replacement(n: usize, amount: usize, seed: u64) -> Vec<usize> {
    if amount >= n {
        return (0..n).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen = rand::seq::index::sample(&mut rng, n, amount).into_vec();
    chosen.sort_unstable();
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldzones_core::GeoTransform;
    use geo::polygon;

    fn grid() -> Raster<f64> {
        // 10 x 10 unit cells covering x in [0, 10], y in [0, 10]
        let mut r = Raster::filled(10, 10, 0.0);
        r.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        r
    }

    #[test]
    fn centres_inside_square() {
        let square = polygon![(x: 2.0, y: 2.0), (x: 6.0, y: 2.0), (x: 6.0, y: 6.0), (x: 2.0, y: 6.0)];
        let cells = pixels_in_polygon(&grid(), &square);

        assert_eq!(cells.len(), 16);
        // Row-major: top row of the square first (y = 5.5 is row 4).
        assert_eq!(cells[0], (4, 2));
        assert!(cells.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn triangle_excludes_outside_centres() {
        let tri = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)];
        let g = grid();
        for (row, col) in pixels_in_polygon(&g, &tri) {
            let (x, y) = g.cell_center(row, col);
            assert!(x + y < 10.0);
        }
    }

    #[test]
    fn subset_is_seeded_and_sorted() {
        let a = choose_without_replacement(1000, 50, 42);
        let b = choose_without_replacement(1000, 50, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&i| i < 1000));

        assert_eq!(choose_without_replacement(5, 10, 1), vec![0, 1, 2, 3, 4]);
    }
}
