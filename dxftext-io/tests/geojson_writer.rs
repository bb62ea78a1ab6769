use dxftext_core::{
    feature::{FeatureProperties, PlacedPolygon, PolygonRings},
    geometry::Point2,
};
use dxftext_io::{FeatureSaver, GeoJsonWriter, IoError};
use serde_json::Value;

fn ring(coords: &[(f64, f64)]) -> Vec<Point2> {
    coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
}

fn properties(ch: &str) -> FeatureProperties {
    FeatureProperties {
        text: "Oi".to_string(),
        character: ch.to_string(),
        layer: "ANNOT".to_string(),
        font: "test-font".to_string(),
        insert_x_wcs: 10.0,
        insert_y_wcs: 20.0,
    }
}

fn signed_area(coords: &Value) -> f64 {
    let points: Vec<(f64, f64)> = coords
        .as_array()
        .expect("ring array")
        .iter()
        .map(|p| {
            (
                p[0].as_f64().expect("x"),
                p[1].as_f64().expect("y"),
            )
        })
        .collect();
    let mut sum = 0.0;
    for window in points.windows(2) {
        sum += window[0].0 * window[1].1 - window[1].0 * window[0].1;
    }
    sum * 0.5
}

fn sample_features() -> Vec<PlacedPolygon> {
    // 外环故意写成顺时针、内环逆时针，写出时应被纠正。
    let letter_o = PlacedPolygon {
        parts: vec![PolygonRings {
            exterior: ring(&[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0), (0.0, 0.0)]),
            holes: vec![ring(&[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0), (1.0, 1.0)])],
        }],
        properties: properties("O"),
    };
    let letter_i = PlacedPolygon {
        parts: vec![
            PolygonRings {
                exterior: ring(&[(5.0, 0.0), (6.0, 0.0), (6.0, 3.0), (5.0, 3.0), (5.0, 0.0)]),
                holes: vec![],
            },
            PolygonRings {
                exterior: ring(&[(5.0, 4.0), (6.0, 4.0), (6.0, 5.0), (5.0, 5.0), (5.0, 4.0)]),
                holes: vec![],
            },
        ],
        properties: properties("i"),
    };
    vec![letter_o, letter_i]
}

#[test]
fn writes_feature_collection_with_rfc7946_winding() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("out.geojson");
    GeoJsonWriter::new()
        .save(&sample_features(), &path)
        .expect("写出 GeoJSON 失败");

    let content = std::fs::read_to_string(&path).expect("read output");
    assert!(content.contains("\n  \"features\""), "默认输出应带两空格缩进");
    let root: Value = serde_json::from_str(&content).expect("parse output");
    assert_eq!(root["type"], "FeatureCollection");
    let features = root["features"].as_array().expect("features array");
    assert_eq!(features.len(), 2);

    let o = &features[0];
    assert_eq!(o["type"], "Feature");
    assert_eq!(o["geometry"]["type"], "Polygon");
    let rings = o["geometry"]["coordinates"].as_array().expect("rings");
    assert_eq!(rings.len(), 2);
    assert!(signed_area(&rings[0]) > 0.0, "外环应为逆时针");
    assert!(signed_area(&rings[1]) < 0.0, "内环应为顺时针");
    let first = &rings[0][0];
    let last = rings[0].as_array().expect("ring").last().expect("last");
    assert_eq!(first, last, "环必须闭合");

    assert_eq!(o["properties"]["text"], "Oi");
    assert_eq!(o["properties"]["char"], "O");
    assert_eq!(o["properties"]["layer"], "ANNOT");
    assert_eq!(o["properties"]["font"], "test-font");
    assert_eq!(o["properties"]["insert_x_wcs"], 10.0);
    assert_eq!(o["properties"]["insert_y_wcs"], 20.0);

    let i = &features[1];
    assert_eq!(i["geometry"]["type"], "MultiPolygon");
    assert_eq!(
        i["geometry"]["coordinates"].as_array().expect("polygons").len(),
        2
    );
}

#[test]
fn empty_input_writes_empty_collection() {
    let serialized = GeoJsonWriter::with_pretty(false)
        .to_string(&[])
        .expect("serialize empty collection");
    assert_eq!(serialized, r#"{"type":"FeatureCollection","features":[]}"#);
}

#[test]
fn unwritable_path_is_reported() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("missing-dir").join("out.geojson");
    let err = GeoJsonWriter::new()
        .save(&sample_features(), &path)
        .expect_err("目录不存在时写出应失败");
    assert!(matches!(err, IoError::WriteError { .. }), "unexpected error: {err}");
    assert!(!path.exists());
}
