use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;

use dxftext_core::document::Entity;
use dxftext_io::{DocumentLoader, DxfFacade, IoError};
use glam::DVec3;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_text_entities_skips_unrelated_sections_and_entities() {
    let loader = DxfFacade::new();
    let doc = loader
        .load(&fixture("text_entities.dxf"))
        .expect("读取 TEXT/MTEXT DXF 失败");

    assert_eq!(doc.entities().count(), 4, "LINE 应被跳过");

    let texts: Vec<_> = doc
        .entities()
        .filter_map(|(_, entity)| match entity {
            Entity::Text(text) => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts.len(), 3);

    let temp = texts[0];
    assert_eq!(temp.content, "TEMP");
    assert_eq!(temp.layer, "ANNOT");
    assert!((temp.height - 1.0).abs() < 1e-9);
    assert!(temp.rotation.abs() < 1e-9);
    assert!(!temp.paper_space);

    let degrees = texts[1];
    assert_eq!(degrees.content, "45°");
    assert!((degrees.insert.x() - 100.5).abs() < 1e-9);
    assert!((degrees.insert.y() + 20.25).abs() < 1e-9);
    assert!((degrees.rotation - 30f64.to_radians()).abs() < 1e-9);
    assert!((degrees.width_factor - 0.8).abs() < 1e-9);
    assert_eq!(degrees.style.as_deref(), Some("Romans"));

    let sheet = texts[2];
    assert!(sheet.paper_space, "组码 67=1 应标记为图纸空间");

    let mtext = doc
        .entities()
        .find_map(|(_, entity)| match entity {
            Entity::MText(mtext) => Some(mtext),
            _ => None,
        })
        .expect("未找到 MText 实体");
    assert_eq!(mtext.content, "First line\nSecond 1/2");
    assert_eq!(mtext.layer, "NOTES");
    assert!(mtext.reference_width.is_none());
    assert!((mtext.rotation() - FRAC_PI_2).abs() < 1e-9);
    assert!((mtext.line_spacing_factor - 1.5).abs() < 1e-9);
    assert!((mtext.line_pitch() - 2.5 * 5.0 / 3.0 * 1.5).abs() < 1e-9);
    assert_eq!(mtext.attachment_point, 5);
    assert_eq!(mtext.style.as_deref(), Some("Standard"));

    let layers: Vec<&str> = doc.entities().map(|(_, entity)| entity.layer_name()).collect();
    assert_eq!(layers, vec!["ANNOT", "ANNOT", "NOTES", "SHEET"]);
}

#[test]
fn load_blocks_with_nested_inserts_and_attributes() {
    let loader = DxfFacade::new();
    let doc = loader
        .load(&fixture("block_entities.dxf"))
        .expect("读取含 BLOCK/INSERT 的 DXF 失败");

    assert!(doc.block("*Model_Space").is_none(), "布局块不应被收集");
    assert_eq!(doc.blocks().count(), 2);

    let block = doc.block("MYBLOCK").expect("未找到块定义 MYBLOCK");
    assert!((block.base_point.x() - 1.0).abs() < 1e-9);
    assert!((block.base_point.y() - 1.0).abs() < 1e-9);
    assert_eq!(block.entities.len(), 2, "ATTDEF 与 CIRCLE 应被跳过");
    match &block.entities[0] {
        Entity::Text(text) => assert_eq!(text.content, "A"),
        other => panic!("块内首个实体应为 TEXT: {other:?}"),
    }
    match &block.entities[1] {
        Entity::BlockReference(inner) => {
            assert_eq!(inner.name, "INNER");
            assert!(inner.attributes.is_empty());
        }
        other => panic!("块内第二个实体应为 INSERT: {other:?}"),
    }

    let inner = doc.block("INNER").expect("未找到块定义 INNER");
    match &inner.entities[0] {
        Entity::MText(mtext) => assert_eq!(mtext.content, "Nested"),
        other => panic!("INNER 块应包含 MTEXT: {other:?}"),
    }

    let inserts: Vec<_> = doc
        .entities()
        .filter_map(|(_, entity)| match entity {
            Entity::BlockReference(block) => Some(block),
            _ => None,
        })
        .collect();
    assert_eq!(inserts.len(), 2);

    let insert = inserts[0];
    assert_eq!(insert.name, "MYBLOCK");
    assert!((insert.insert.x() - 10.0).abs() < 1e-9);
    assert!((insert.insert.y() - 20.0).abs() < 1e-9);
    assert!((insert.scale.x() - 2.0).abs() < 1e-9);
    assert!((insert.scale.y() - 2.0).abs() < 1e-9);
    assert!((insert.rotation - FRAC_PI_2).abs() < 1e-9);
    assert_eq!(insert.attributes.len(), 2);
    assert_eq!(insert.attributes[0].tag, "ID");
    assert_eq!(insert.attributes[0].text, "V-101");
    assert!(!insert.attributes[0].is_invisible);
    assert!(insert.attributes[1].is_invisible);

    assert_eq!(inserts[1].name, "MISSING");
}

#[test]
fn missing_file_reports_read_error() {
    let loader = DxfFacade::new();
    let err = loader
        .load(&fixture("does_not_exist.dxf"))
        .expect_err("缺失文件应返回错误");
    assert!(matches!(err, IoError::ReadError { .. }), "unexpected error: {err}");
}

#[test]
fn text_without_height_uses_default_height() {
    let data = "0\nSECTION\n2\nENTITIES\n0\nTEXT\n10\n0\n20\n0\n1\nX\n0\nENDSEC\n0\nEOF\n";
    let doc = DxfFacade::new().parse_str(data).expect("缺少组码 40 时应使用缺省字高");
    match doc.entities().next() {
        Some((_, Entity::Text(text))) => {
            assert_eq!(text.content, "X");
            assert!((text.height - 2.5).abs() < 1e-12);
        }
        other => panic!("unexpected entity: {other:?}"),
    }
}

#[test]
fn malformed_height_is_invalid() {
    let data = "0\nSECTION\n2\nENTITIES\n0\nTEXT\n10\n0\n20\n0\n40\nabc\n1\nX\n0\nENDSEC\n0\nEOF\n";
    let err = DxfFacade::new()
        .parse_str(data)
        .expect_err("非数值的组码 40 应解析失败");
    match err {
        IoError::InvalidDocument(message) => assert!(message.contains("abc"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn load_mirrored_entities_keeps_extrusion() {
    let doc = DxfFacade::new()
        .load(&fixture("mirrored_entities.dxf"))
        .expect("读取含拉伸方向的 DXF 失败");

    let flipped = DVec3::new(0.0, 0.0, -1.0);
    let mut seen = 0;
    for (_, entity) in doc.entities() {
        match entity {
            Entity::Text(text) => {
                assert_eq!(text.content, "MIRROR");
                assert!((text.insert.x() - 10.0).abs() < 1e-9, "插入点保持 OCS 坐标");
                assert_eq!(text.extrusion, flipped);
                seen += 1;
            }
            Entity::BlockReference(block) => {
                assert_eq!(block.extrusion, flipped);
                assert_eq!(block.attributes.len(), 1);
                assert_eq!(block.attributes[0].extrusion, flipped);
                seen += 1;
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }
    assert_eq!(seen, 2);

    let block = doc.block("PLATE").expect("未找到块定义 PLATE");
    match &block.entities[0] {
        Entity::Text(text) => assert_eq!(text.extrusion, DVec3::Z),
        other => panic!("块内应为 TEXT: {other:?}"),
    }
}

#[test]
fn truncated_section_is_invalid() {
    let data = "0\nSECTION\n2\nENTITIES\n0\nTEXT\n10\n0\n20\n0\n40\n1\n1\nX\n";
    let err = DxfFacade::new()
        .parse_str(data)
        .expect_err("缺少 ENDSEC 应解析失败");
    assert!(matches!(err, IoError::InvalidDocument(_)));
}

#[test]
fn non_utf8_bytes_are_decoded_lossily() {
    let mut bytes = b"0\nSECTION\n2\nENTITIES\n0\nTEXT\n10\n0\n20\n0\n40\n1\n1\nCaf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"\n0\nENDSEC\n0\nEOF\n");
    let file = tempfile::NamedTempFile::new().expect("create temp file");
    std::fs::write(file.path(), &bytes).expect("write temp dxf");

    let doc = DxfFacade::new()
        .load(file.path())
        .expect("非 UTF-8 字节不应导致读取失败");
    match doc.entities().next() {
        Some((_, Entity::Text(text))) => assert!(text.content.starts_with("Caf")),
        other => panic!("expected text entity, got {other:?}"),
    }
}
