//! GeoTIFF reading/writing on top of the `tiff` crate.
//!
//! Supports the subset needed by the pipeline: single-band rasters with
//! pixel-scale + tie-point georeferencing, an EPSG code in the GeoKey
//! directory and the GDAL nodata tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use crate::zones::ZoneRaster;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray8};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

// The decoder keys its directory by named tag, so `Tag::Unknown(33550)`
// never matches an entry it parsed. Always use these.
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Same as [`read_geotiff`] but from an in-memory buffer
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".into())),
    };

    // Multi-sample images decode interleaved; keep only the first band.
    let data = if data.len() > rows * cols && rows * cols > 0 && data.len() % (rows * cols) == 0 {
        let step = data.len() / (rows * cols);
        data.into_iter().step_by(step).collect()
    } else {
        data
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    if let Ok(text) = decoder.get_tag_ascii_string(GDAL_NODATA) {
        let nodata = text
            .trim_matches(char::from(0))
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(num_traits::cast::<f64, T>);
        raster.set_nodata(nodata);
    }

    Ok(raster)
}

fn cast_all<S, T>(buf: &[S]) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok()?;
    // Header is 4 shorts, then 4 shorts per key; only inline (location 0) values.
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            matches!(entry[0], GEOGRAPHIC_TYPE_KEY | PROJECTED_CS_TYPE_KEY) && entry[1] == 0
        })
        .map(|entry| CRS::from_epsg(entry[3] as u32))
}

/// Write a Raster to a single-band 32-bit float GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_float(raster, file)
}

/// Write a Raster to an in-memory float GeoTIFF
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_float(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

/// Write a zone raster as an 8-bit GeoTIFF file
pub fn write_zone_geotiff<P: AsRef<Path>>(raster: &ZoneRaster, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_zones(raster, file)
}

/// Encode a zone raster as an in-memory 8-bit GeoTIFF
pub fn zone_geotiff_to_buffer(raster: &ZoneRaster) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_zones(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_float<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();
    let nodata = raster.nodata().and_then(RasterElement::to_f64);
    encode::<Gray32Float, _, T>(raster, nodata, &data, writer)
}

fn encode_zones<W: Write + Seek>(raster: &ZoneRaster, writer: W) -> Result<()> {
    let data: Vec<u8> = raster.data().iter().copied().collect();
    let nodata = raster.nodata().map(f64::from);
    encode::<Gray8, _, u8>(raster, nodata, &data, writer)
}

fn encode<C, W, T>(raster: &Raster<T>, nodata: Option<f64>, data: &[C::Inner], writer: W) -> Result<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
    T: RasterElement,
{
    let tag_err = |what: &str, e: tiff::TiffError| Error::Other(format!("Cannot write {}: {}", what, e));

    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(|e| tag_err("TIFF image", e))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &scale[..])
        .map_err(|e| tag_err("pixel scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tiepoint[..])
        .map_err(|e| tag_err("tiepoint tag", e))?;

    let geokeys = geo_key_directory(raster.crs());
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, geokeys.as_slice())
        .map_err(|e| tag_err("geokey tag", e))?;

    if let Some(nodata) = nodata.filter(|v| v.is_finite()) {
        image
            .encoder()
            .write_tag(GDAL_NODATA, nodata.to_string().as_str())
            .map_err(|e| tag_err("nodata tag", e))?;
    }

    image
        .write_data(data)
        .map_err(|e| tag_err("image data", e))?;

    Ok(())
}

/// GeoKey directory for the raster's CRS. Rasters without a CRS are tagged
/// as WGS84, the only frame the pipeline produces.
fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let geographic = crs.map_or(true, CRS::is_geographic);
    let epsg = crs.and_then(CRS::epsg).unwrap_or(4326);

    let (model_type, crs_key) = if geographic {
        (2, GEOGRAPHIC_TYPE_KEY)
    } else {
        (1, PROJECTED_CS_TYPE_KEY)
    };

    vec![
        1, 1, 0, 3, // version 1.1.0, 3 keys
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1, // RasterPixelIsArea
        crs_key, 0, 1, epsg as u16,
    ]
}
