//! ESRI Shapefile (`.shp`) polygon reader.
//!
//! Only the main file is read; `.shx` and `.dbf` are not needed to recover
//! geometry. Multi-ring records are split into polygons by ring orientation:
//! clockwise rings are outer boundaries, counter-clockwise rings are holes of
//! the preceding outer ring.

use crate::error::{Error, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use geo::{Coord, LineString, Polygon};
use std::io::{Cursor, Read};
use std::path::Path;

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const HEADER_LEN: usize = 100;

/// Shape type codes from the ESRI whitepaper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    Null,
    Polygon,
    PolygonZ,
    PolygonM,
    Other(i32),
}

impl ShapeType {
    fn from_code(code: i32) -> Self {
        match code {
            0 => ShapeType::Null,
            5 => ShapeType::Polygon,
            15 => ShapeType::PolygonZ,
            25 => ShapeType::PolygonM,
            other => ShapeType::Other(other),
        }
    }

    fn is_polygon(&self) -> bool {
        matches!(self, ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM)
    }
}

/// Read every polygon of a `.shp` file, in record order.
pub fn read_polygons<P: AsRef<Path>>(path: P) -> Result<Vec<Polygon<f64>>> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_polygons(&bytes)
}

/// Parse the polygons of an in-memory `.shp` file.
pub fn parse_polygons(bytes: &[u8]) -> Result<Vec<Polygon<f64>>> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Shapefile(format!(
            "file is {} bytes, shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let mut header = Cursor::new(&bytes[..HEADER_LEN]);
    let file_code = header.read_i32::<BigEndian>()?;
    if file_code != FILE_CODE {
        return Err(Error::Shapefile(format!("bad file code {}", file_code)));
    }
    header.set_position(28);
    let version = header.read_i32::<LittleEndian>()?;
    if version != VERSION {
        return Err(Error::Shapefile(format!("unsupported version {}", version)));
    }
    let shape_type = ShapeType::from_code(header.read_i32::<LittleEndian>()?);
    if !shape_type.is_polygon() && shape_type != ShapeType::Null {
        return Err(Error::Shapefile(format!(
            "expected polygon geometry, found {:?}",
            shape_type
        )));
    }

    let mut polygons = Vec::new();
    let mut pos = HEADER_LEN;
    while pos + 8 <= bytes.len() {
        let mut rec = Cursor::new(&bytes[pos..pos + 8]);
        let number = rec.read_i32::<BigEndian>()?;
        let words = rec.read_i32::<BigEndian>()?;
        let len = usize::try_from(words)
            .map_err(|_| Error::Shapefile(format!("record {} has negative length", number)))?
            * 2;
        let start = pos + 8;
        let end = start + len;
        if end > bytes.len() {
            return Err(Error::Shapefile(format!("record {} is truncated", number)));
        }
        polygons.extend(parse_record(number, &bytes[start..end])?);
        pos = end;
    }

    Ok(polygons)
}

fn parse_record(number: i32, content: &[u8]) -> Result<Vec<Polygon<f64>>> {
    let mut rdr = Cursor::new(content);
    let shape_type = ShapeType::from_code(rdr.read_i32::<LittleEndian>()?);
    match shape_type {
        ShapeType::Null => return Ok(Vec::new()),
        t if t.is_polygon() => {}
        other => {
            return Err(Error::Shapefile(format!(
                "record {} has non-polygon shape {:?}",
                number, other
            )))
        }
    }

    // Skip record bounding box.
    let mut bbox = [0u8; 32];
    rdr.read_exact(&mut bbox)?;

    let num_parts = read_count(&mut rdr, number, "parts")?;
    let num_points = read_count(&mut rdr, number, "points")?;
    if content.len() < 44 + 4 * num_parts + 16 * num_points {
        return Err(Error::Shapefile(format!("record {} is truncated", number)));
    }

    let mut starts = Vec::with_capacity(num_parts);
    for _ in 0..num_parts {
        starts.push(read_count(&mut rdr, number, "part index")?);
    }
    let mut points = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let x = rdr.read_f64::<LittleEndian>()?;
        let y = rdr.read_f64::<LittleEndian>()?;
        points.push(Coord { x, y });
    }
    // Z and M arrays of PolygonZ/PolygonM records follow; they are ignored.

    let mut rings = Vec::with_capacity(num_parts);
    for (i, &s) in starts.iter().enumerate() {
        let e = starts.get(i + 1).copied().unwrap_or(num_points);
        if s > e || e > num_points {
            return Err(Error::Shapefile(format!("record {} has invalid part offsets", number)));
        }
        rings.push(points[s..e].to_vec());
    }

    Ok(assemble_polygons(rings))
}

fn read_count(rdr: &mut Cursor<&[u8]>, number: i32, what: &str) -> Result<usize> {
    let n = rdr.read_i32::<LittleEndian>()?;
    usize::try_from(n)
        .map_err(|_| Error::Shapefile(format!("record {} has negative {} ({})", number, what, n)))
}

/// Group rings into polygons by orientation.
fn assemble_polygons(rings: Vec<Vec<Coord<f64>>>) -> Vec<Polygon<f64>> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings.into_iter().filter(|r| r.len() >= 3) {
        let clockwise = signed_area(&ring) < 0.0;
        let ring = LineString::new(ring);
        match polygons.last_mut() {
            Some((_, holes)) if !clockwise => holes.push(ring),
            // A counter-clockwise first ring is taken as an outer boundary.
            _ => polygons.push((ring, Vec::new())),
        }
    }

    polygons
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect()
}

/// Shoelace signed area: negative for clockwise rings.
fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

/// Encode polygons as a `.shp` file (shape type 5).
///
/// Exterior rings are written clockwise and holes counter-clockwise,
/// whatever their input orientation.
pub fn encode_polygons(polygons: &[Polygon<f64>]) -> Result<Vec<u8>> {
    let mut records = Vec::new();
    let mut extent = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];

    for (i, polygon) in polygons.iter().enumerate() {
        let mut rings: Vec<Vec<Coord<f64>>> = Vec::new();
        rings.push(oriented(&polygon.exterior().0, true));
        for hole in polygon.interiors() {
            rings.push(oriented(&hole.0, false));
        }
        let points: Vec<Coord<f64>> = rings.iter().flatten().copied().collect();
        let bbox = points.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |b, c| [b[0].min(c.x), b[1].min(c.y), b[2].max(c.x), b[3].max(c.y)],
        );
        extent = [
            extent[0].min(bbox[0]),
            extent[1].min(bbox[1]),
            extent[2].max(bbox[2]),
            extent[3].max(bbox[3]),
        ];

        let mut content = Vec::new();
        content.write_i32::<LittleEndian>(5)?;
        for v in bbox {
            content.write_f64::<LittleEndian>(v)?;
        }
        content.write_i32::<LittleEndian>(rings.len() as i32)?;
        content.write_i32::<LittleEndian>(points.len() as i32)?;
        let mut offset = 0;
        for ring in &rings {
            content.write_i32::<LittleEndian>(offset)?;
            offset += ring.len() as i32;
        }
        for c in &points {
            content.write_f64::<LittleEndian>(c.x)?;
            content.write_f64::<LittleEndian>(c.y)?;
        }

        records.write_i32::<BigEndian>(i as i32 + 1)?;
        records.write_i32::<BigEndian>((content.len() / 2) as i32)?;
        records.extend_from_slice(&content);
    }

    if polygons.is_empty() {
        extent = [0.0; 4];
    }

    let mut out = Vec::with_capacity(HEADER_LEN + records.len());
    out.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        out.write_i32::<BigEndian>(0)?;
    }
    out.write_i32::<BigEndian>(((HEADER_LEN + records.len()) / 2) as i32)?;
    out.write_i32::<LittleEndian>(VERSION)?;
    out.write_i32::<LittleEndian>(5)?;
    for v in extent {
        out.write_f64::<LittleEndian>(v)?;
    }
    for _ in 0..4 {
        out.write_f64::<LittleEndian>(0.0)?;
    }
    out.extend_from_slice(&records);
    Ok(out)
}

fn oriented(ring: &[Coord<f64>], clockwise: bool) -> Vec<Coord<f64>> {
    let mut ring = ring.to_vec();
    if (signed_area(&ring) < 0.0) != clockwise {
        ring.reverse();
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn reads_back_encoded_polygons() {
        let field = polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)
        ];
        let bytes = encode_polygons(&[field]).unwrap();
        let polygons = parse_polygons(&bytes).unwrap();

        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior().0.len(), 5);
        assert!(polygons[0].interiors().is_empty());
    }

    #[test]
    fn holes_attach_to_preceding_outer_ring() {
        let with_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![LineString::from(vec![(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)])],
        );
        let other = Polygon::new(
            LineString::from(vec![(20.0, 0.0), (30.0, 0.0), (30.0, 10.0), (20.0, 0.0)]),
            vec![],
        );

        let polygons = parse_polygons(&encode_polygons(&[with_hole, other]).unwrap()).unwrap();
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].interiors().len(), 1);
        assert_eq!(polygons[1].exterior().0.len(), 4);
        assert!(polygons[1].interiors().is_empty());
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = encode_polygons(&[]).unwrap();
        assert!(parse_polygons(&bytes).unwrap().is_empty());

        bytes[3] = 0;
        assert!(matches!(parse_polygons(&bytes), Err(Error::Shapefile(_))));
        assert!(parse_polygons(&bytes[..50]).is_err());
    }

    #[test]
    fn signed_area_orientation() {
        let ccw = [Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }, Coord { x: 0.0, y: 1.0 }];
        assert!(signed_area(&ccw) > 0.0);
        assert!(signed_area(&oriented(&ccw, true)) < 0.0);
    }
}
