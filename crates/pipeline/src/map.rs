//! GeoJSON layer of zoned sample points for map viewers

use fieldzones_core::{SampleSet, ZoneAssignment};
use serde_json::{json, Value};

/// Fill colour per zone, by 0-based label.
pub const ZONE_COLORS: [&str; 7] = ["#d7191c", "#fdae61", "#ffffbf", "#a6d96a", "#1a9641", "#2b83ba", "#7b3294"];

/// Colour for 0-based `label`, cycling past the palette.
pub fn zone_color(label: usize) -> &'static str {
    ZONE_COLORS[label % ZONE_COLORS.len()]
}

/// FeatureCollection of points with `zone` (1-based), `color` and the
/// sampled feature values as properties.
pub fn zone_layer(samples: &SampleSet, assignment: &ZoneAssignment) -> Value {
    let features: Vec<Value> = samples
        .points()
        .iter()
        .zip(assignment.labels())
        .map(|(p, &label)| {
            let mut properties = serde_json::Map::new();
            properties.insert("zone".into(), json!(label + 1));
            properties.insert("color".into(), json!(zone_color(label)));
            for (f, v) in samples.features().iter().zip(&p.values) {
                properties.insert(f.band_name().to_string(), json!(v));
            }
            json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [p.x, p.y] },
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldzones_core::{Feature, SamplePoint};

    #[test]
    fn layer_has_one_point_per_sample() {
        let points = vec![
            SamplePoint::new(-49.995, -16.995, vec![0.8, 810.0]),
            SamplePoint::new(-49.994, -16.996, vec![0.2, 790.0]),
        ];
        let samples = SampleSet::new(vec![Feature::Ndvi, Feature::Altitude], points).unwrap();
        let assignment = ZoneAssignment::new(2, vec![1, 0]).unwrap();

        let layer = zone_layer(&samples, &assignment);
        let features = layer["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["zone"], 2);
        assert_eq!(features[0]["properties"]["color"], ZONE_COLORS[1]);
        assert_eq!(features[0]["properties"]["ALT"], 810.0);
        assert_eq!(features[1]["geometry"]["coordinates"][0], -49.994);
    }

    #[test]
    fn colors_are_distinct() {
        for i in 0..ZONE_COLORS.len() {
            for j in (i + 1)..ZONE_COLORS.len() {
                assert_ne!(zone_color(i), zone_color(j));
            }
        }
    }
}
