//! 把一条文字记录排成逐字符的多边形。
//!
//! 先在字体单位下逐行摆放字形，每行按墨迹包围盒水平居中，行与行向下堆叠；
//! 再把整体包围盒中心移到原点，最后依次施加缩放、旋转并平移到插入点。

use std::sync::Arc;

use dxftext_core::feature::{FeatureProperties, PlacedPolygon, PolygonRings};
use dxftext_core::geometry::{Bounds2D, Point2};
use glam::{DAffine2, DVec2};
use tracing::trace;

use crate::collector::TextRecord;
use crate::diagnostics::Diagnostics;
use crate::font::{GlyphOutline, GlyphSource};
use crate::glyph_cache::GlyphCache;

/// 已摆放到文字局部坐标（图形单位，未旋转）的一个字符。
struct LocalGlyph {
    outline: Arc<GlyphOutline>,
    rings: Vec<Vec<DVec2>>,
}

pub fn layout_record(
    record: &TextRecord,
    cache: &mut GlyphCache,
    source: &dyn GlyphSource,
    diagnostics: &mut Diagnostics,
) -> Vec<PlacedPolygon> {
    let units_per_em = source.units_per_em();
    if record.content.is_empty() || units_per_em <= 0.0 {
        return Vec::new();
    }

    let em_scale = record.height / units_per_em;
    let x_scale = em_scale * record.width_factor;
    let line_spacing = record.line_spacing().unwrap_or(record.height);

    let mut glyphs: Vec<LocalGlyph> = Vec::new();
    for (line_index, line) in record.lines().into_iter().enumerate() {
        let baseline = -(line_index as f64) * line_spacing;
        let mut pen = 0.0;
        let mut line_glyphs: Vec<LocalGlyph> = Vec::new();
        let mut line_bounds = Bounds2D::empty();

        for character in line.chars() {
            let character = if character == '\t' { ' ' } else { character };
            let outline = cache.get(character, source, diagnostics);
            if !outline.is_empty() {
                let rings: Vec<Vec<DVec2>> = outline
                    .rings
                    .iter()
                    .map(|ring| {
                        ring.iter()
                            .map(|p| DVec2::new((pen + p.x) * x_scale, p.y * em_scale + baseline))
                            .collect()
                    })
                    .collect();
                for point in rings.iter().flatten() {
                    line_bounds.include_point(Point2::from_vec(*point));
                }
                line_glyphs.push(LocalGlyph {
                    outline: Arc::clone(&outline),
                    rings,
                });
            }
            pen += outline.advance;
        }

        if !line_bounds.is_empty() {
            let shift = DVec2::new(-line_bounds.center().x(), 0.0);
            for glyph in &mut line_glyphs {
                for point in glyph.rings.iter_mut().flatten() {
                    *point += shift;
                }
            }
        }
        glyphs.append(&mut line_glyphs);
    }

    let bounds = Bounds2D::from_points(
        glyphs
            .iter()
            .flat_map(|glyph| glyph.rings.iter().flatten())
            .map(|point| Point2::from_vec(*point)),
    );
    if bounds.is_empty() {
        return Vec::new();
    }

    let placement = DAffine2::from_scale_angle_translation(
        record.scale.as_vec2(),
        record.rotation_degrees.to_radians(),
        record.insertion_point.as_vec2(),
    ) * DAffine2::from_translation(-bounds.center().as_vec2());

    trace!(
        content = %record.content,
        glyphs = glyphs.len(),
        width = bounds.width(),
        height = bounds.height(),
        "laid out text record"
    );

    glyphs
        .into_iter()
        .map(|glyph| place_glyph(record, source, &placement, glyph))
        .collect()
}

fn place_glyph(
    record: &TextRecord,
    source: &dyn GlyphSource,
    placement: &DAffine2,
    glyph: LocalGlyph,
) -> PlacedPolygon {
    let ring = |index: usize| -> Vec<Point2> {
        glyph.rings[index]
            .iter()
            .map(|point| Point2::from_vec(placement.transform_point2(*point)))
            .collect()
    };
    let parts = glyph
        .outline
        .shapes
        .iter()
        .map(|group| PolygonRings {
            exterior: ring(group.exterior),
            holes: group.holes.iter().map(|&hole| ring(hole)).collect(),
        })
        .collect();

    PlacedPolygon {
        parts,
        properties: FeatureProperties {
            text: record.content.clone(),
            character: glyph.outline.character.to_string(),
            layer: record.layer.clone(),
            font: source.identity().to_string(),
            insert_x_wcs: record.insertion_point.x(),
            insert_y_wcs: record.insertion_point.y(),
        },
    }
}

#[cfg(test)]
mod tests {
    use dxftext_core::geometry::Vector2;

    use super::*;
    use crate::collector::{RecordSource, TextKind};
    use crate::glyph_cache::tests::BoxFont;

    fn record(content: &str, kind: TextKind) -> TextRecord {
        TextRecord {
            content: content.to_string(),
            insertion_point: Point2::new(0.0, 0.0),
            rotation_degrees: 0.0,
            height: 1.0,
            width_factor: 1.0,
            kind,
            scale: Vector2::new(1.0, 1.0),
            layer: "ANNOT".to_string(),
            style: None,
            source: RecordSource::TopLevel,
            block_transform: None,
        }
    }

    fn layout(record: &TextRecord, font: &BoxFont) -> (Vec<PlacedPolygon>, Diagnostics) {
        let mut cache = GlyphCache::new(0.001);
        let mut diagnostics = Diagnostics::new();
        let polygons = layout_record(record, &mut cache, font, &mut diagnostics);
        (polygons, diagnostics)
    }

    fn bounds(polygons: &[PlacedPolygon]) -> Bounds2D {
        Bounds2D::from_points(polygons.iter().flat_map(|polygon| polygon.points()))
    }

    #[test]
    fn single_line_is_centered_on_insertion_point() {
        let font = BoxFont::new("box");
        let mut text = record("AB", TextKind::Text);
        text.insertion_point = Point2::new(100.0, 50.0);

        let (polygons, diagnostics) = layout(&text, &font);
        assert!(diagnostics.is_empty());
        assert_eq!(polygons.len(), 2);

        let bounds = bounds(&polygons);
        // 两个 0.6 宽的方块紧挨着：总宽 1.2，高 1.0。
        assert!((bounds.width() - 1.2).abs() < 1e-9);
        assert!((bounds.height() - 1.0).abs() < 1e-9);
        assert!((bounds.center().x() - 100.0).abs() < 1e-9);
        assert!((bounds.center().y() - 50.0).abs() < 1e-9);

        assert_eq!(polygons[0].properties.character, "A");
        assert_eq!(polygons[1].properties.character, "B");
        assert_eq!(polygons[0].properties.text, "AB");
        assert_eq!(polygons[0].properties.layer, "ANNOT");
        assert_eq!(polygons[0].properties.font, "box");
        assert_eq!(polygons[0].properties.insert_x_wcs, 100.0);
    }

    #[test]
    fn centering_is_symmetric_under_rotation() {
        let font = BoxFont::new("box");
        let mut text = record("HELLO", TextKind::Text);
        text.insertion_point = Point2::new(-3.0, 7.5);
        text.height = 2.5;

        for degrees in [0.0, 30.0, 90.0, 135.0, 270.0] {
            text.rotation_degrees = degrees;
            let (polygons, _) = layout(&text, &font);
            let bounds = bounds(&polygons);
            assert!(
                (bounds.center().x() + 3.0).abs() < 1e-9 && (bounds.center().y() - 7.5).abs() < 1e-9,
                "rotation {degrees}: center ({}, {})",
                bounds.center().x(),
                bounds.center().y()
            );
        }
    }

    #[test]
    fn rotation_turns_the_baseline() {
        let font = BoxFont::new("box");
        let mut text = record("AB", TextKind::Text);
        text.rotation_degrees = 90.0;

        let (polygons, _) = layout(&text, &font);
        let bounds = bounds(&polygons);
        assert!((bounds.width() - 1.0).abs() < 1e-9);
        assert!((bounds.height() - 1.2).abs() < 1e-9);
        // 第一个字符在旋转后位于下方。
        let first = Bounds2D::from_points(polygons[0].points());
        let second = Bounds2D::from_points(polygons[1].points());
        assert!(first.center().y() < second.center().y());
    }

    #[test]
    fn multiline_text_centers_each_line() {
        let font = BoxFont::new("box");
        let text = record("AAAA\nA", TextKind::MText { line_spacing: 2.0 });

        let (polygons, _) = layout(&text, &font);
        assert_eq!(polygons.len(), 5);
        let bounds = bounds(&polygons);
        // 两行：顶行顶端 y=1，底行底端 y=-2，总高 3。
        assert!((bounds.height() - 3.0).abs() < 1e-9);
        assert!((bounds.width() - 2.4).abs() < 1e-9);
        assert!(bounds.center().x().abs() < 1e-9);
        assert!(bounds.center().y().abs() < 1e-9);

        let last_line = Bounds2D::from_points(polygons[4].points());
        assert!(last_line.center().x().abs() < 1e-9, "短行应水平居中");
        assert!((last_line.center().y() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn width_factor_and_scale_stretch_glyphs() {
        let font = BoxFont::new("box");
        let mut text = record("A", TextKind::Text);
        text.width_factor = 0.5;
        text.scale = Vector2::new(2.0, 3.0);

        let (polygons, _) = layout(&text, &font);
        let bounds = bounds(&polygons);
        assert!((bounds.width() - 0.6).abs() < 1e-9);
        assert!((bounds.height() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn spaces_and_missing_glyphs_advance_without_polygons() {
        let mut font = BoxFont::new("box");
        font.missing.push('?');
        let text = record("A ?A", TextKind::Text);

        let (polygons, diagnostics) = layout(&text, &font);
        assert_eq!(polygons.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        // A(0.6) + 空格(0.6) + 缺失(0.5) + A(0.6) = 2.3。
        assert!((bounds(&polygons).width() - 2.3).abs() < 1e-9);
    }

    #[test]
    fn tabs_render_as_spaces() {
        let font = BoxFont::new("box");
        let text = record("A\tA", TextKind::Text);

        let (polygons, _) = layout(&text, &font);
        assert_eq!(polygons.len(), 2);
        assert!(!font.calls.borrow().contains(&'\t'));
        assert!((bounds(&polygons).width() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn empty_or_blank_records_produce_nothing() {
        let font = BoxFont::new("box");
        assert!(layout(&record("", TextKind::Text), &font).0.is_empty());
        assert!(layout(&record("   ", TextKind::Text), &font).0.is_empty());
        assert!(font.calls.borrow().iter().all(|c| *c == ' '));
    }

    #[test]
    fn rings_stay_closed_after_placement() {
        let font = BoxFont::new("box");
        let mut text = record("AB", TextKind::Text);
        text.rotation_degrees = 33.0;
        text.insertion_point = Point2::new(512_345.6, 178_901.2);

        let (polygons, _) = layout(&text, &font);
        for polygon in &polygons {
            for ring in polygon.rings() {
                assert!(ring.len() >= 4);
                assert_eq!(ring.first(), ring.last());
            }
        }
    }
}
