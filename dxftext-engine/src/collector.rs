//! 从文档中收集所有需要渲染的文字，块参照会被递归展开到世界坐标。

use dxftext_core::document::{Attribute, BlockReference, Document, Entity, MText, Text};
use dxftext_core::geometry::{Point2, Vector2, ocs_to_wcs};
use glam::{DAffine2, DVec2, DVec3};
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum TextKind {
    Text,
    /// 多行文字，`line_spacing` 为相邻基线的距离（图形单位）。
    MText { line_spacing: f64 },
}

/// 文字来自何处，便于日志与排错。
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSource {
    TopLevel,
    /// 位于块定义内部，`path` 为由外到内的块名链。
    Block { path: Vec<String> },
    Attribute { tag: String },
}

/// 一条待排版的文字，所有几何量均已换算到世界坐标。
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecord {
    pub content: String,
    pub insertion_point: Point2,
    pub rotation_degrees: f64,
    pub height: f64,
    pub width_factor: f64,
    pub kind: TextKind,
    /// 沿文字方向与其法向的缩放，`y` 为负表示镜像。
    pub scale: Vector2,
    pub layer: String,
    pub style: Option<String>,
    pub source: RecordSource,
    pub block_transform: Option<DAffine2>,
}

impl TextRecord {
    #[inline]
    pub fn is_multiline(&self) -> bool {
        matches!(self.kind, TextKind::MText { .. })
    }

    #[inline]
    pub fn line_spacing(&self) -> Option<f64> {
        match self.kind {
            TextKind::Text => None,
            TextKind::MText { line_spacing } => Some(line_spacing),
        }
    }

    /// 单行文字始终只有一行；多行文字按 `\n` 拆分。
    pub fn lines(&self) -> Vec<&str> {
        match self.kind {
            TextKind::Text => vec![self.content.as_str()],
            TextKind::MText { .. } => self.content.split('\n').collect(),
        }
    }
}

/// 遍历模型空间中的文字与块参照，返回扁平的文字记录列表。
///
/// 块自引用（直接或间接）返回 [`EngineError::BlockCycle`]；引用未定义的块只记录诊断。
pub fn collect_text_records(
    document: &Document,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<TextRecord>, EngineError> {
    let mut collector = Collector {
        document,
        diagnostics,
        records: Vec::new(),
        chain: Vec::new(),
    };

    for (id, entity) in document.entities() {
        if entity.in_paper_space() {
            debug!(entity = id.get(), "skipping paper space entity");
            continue;
        }
        collector.visit(entity, None, None)?;
    }

    info!(records = collector.records.len(), "collected text records");
    Ok(collector.records)
}

struct Collector<'a> {
    document: &'a Document,
    diagnostics: &'a mut Diagnostics,
    records: Vec<TextRecord>,
    chain: Vec<String>,
}

/// 实体局部放置量经块变换后得到的世界放置量。
struct Placement {
    point: Point2,
    rotation: f64,
    scale: Vector2,
}

impl<'a> Collector<'a> {
    fn visit(
        &mut self,
        entity: &Entity,
        transform: Option<DAffine2>,
        parent_layer: Option<&str>,
    ) -> Result<(), EngineError> {
        match entity {
            Entity::Text(text) => {
                self.push_text(text, transform, parent_layer);
                Ok(())
            }
            Entity::MText(mtext) => {
                self.push_mtext(mtext, transform, parent_layer);
                Ok(())
            }
            Entity::BlockReference(block) => self.expand(block, transform, parent_layer),
        }
    }

    fn push_text(&mut self, text: &Text, transform: Option<DAffine2>, parent_layer: Option<&str>) {
        let frame = in_ocs(transform, text.extrusion);
        let placement = place(frame, text.insert, text.rotation);
        self.records.push(TextRecord {
            content: text.content.clone(),
            insertion_point: placement.point,
            rotation_degrees: placement.rotation.to_degrees(),
            height: text.height,
            width_factor: text.width_factor,
            kind: TextKind::Text,
            scale: placement.scale,
            layer: effective_layer(&text.layer, parent_layer),
            style: text.style.clone(),
            source: self.source(),
            block_transform: transform,
        });
    }

    fn push_mtext(
        &mut self,
        mtext: &MText,
        transform: Option<DAffine2>,
        parent_layer: Option<&str>,
    ) {
        let placement = place(transform, mtext.insert, mtext.rotation());
        self.records.push(TextRecord {
            content: mtext.content.clone(),
            insertion_point: placement.point,
            rotation_degrees: placement.rotation.to_degrees(),
            height: mtext.height,
            width_factor: 1.0,
            kind: TextKind::MText {
                line_spacing: mtext.line_pitch(),
            },
            scale: placement.scale,
            layer: effective_layer(&mtext.layer, parent_layer),
            style: mtext.style.clone(),
            source: self.source(),
            block_transform: transform,
        });
    }

    fn push_attribute(
        &mut self,
        attribute: &Attribute,
        transform: Option<DAffine2>,
        parent_layer: Option<&str>,
    ) {
        let frame = in_ocs(transform, attribute.extrusion);
        let placement = place(frame, attribute.insert, attribute.rotation);
        self.records.push(TextRecord {
            content: attribute.text.clone(),
            insertion_point: placement.point,
            rotation_degrees: placement.rotation.to_degrees(),
            height: attribute.height,
            width_factor: attribute.width_factor,
            kind: TextKind::Text,
            scale: placement.scale,
            layer: effective_layer(&attribute.layer, parent_layer),
            style: attribute.style.clone(),
            source: RecordSource::Attribute {
                tag: attribute.tag.clone(),
            },
            block_transform: transform,
        });
    }

    fn expand(
        &mut self,
        block: &BlockReference,
        transform: Option<DAffine2>,
        parent_layer: Option<&str>,
    ) -> Result<(), EngineError> {
        let insert_layer = effective_layer(&block.layer, parent_layer);

        // 属性值的坐标与块参照本身处于同一坐标系。
        for attribute in &block.attributes {
            if attribute.is_invisible {
                debug!(tag = %attribute.tag, "skipping invisible attribute");
                continue;
            }
            self.push_attribute(attribute, transform, Some(&insert_layer));
        }

        if self.chain.iter().any(|name| name == &block.name) {
            let mut chain = self.chain.clone();
            chain.push(block.name.clone());
            return Err(EngineError::BlockCycle { chain });
        }

        let document = self.document;
        let Some(definition) = document.block(&block.name) else {
            self.diagnostics.push(Diagnostic::MissingBlock {
                name: block.name.clone(),
            });
            return Ok(());
        };

        let local = DAffine2::from_scale_angle_translation(
            block.scale.as_vec2(),
            block.rotation,
            block.insert.as_vec2(),
        ) * DAffine2::from_translation(-definition.base_point.as_vec2());
        let local = match ocs_to_wcs(block.extrusion) {
            Some(ocs) => ocs * local,
            None => local,
        };
        let combined = match transform {
            Some(parent) => parent * local,
            None => local,
        };

        debug!(
            block = %block.name,
            depth = self.chain.len() + 1,
            entities = definition.entities.len(),
            "expanding block reference"
        );
        self.chain.push(block.name.clone());
        for entity in &definition.entities {
            self.visit(entity, Some(combined), Some(&insert_layer))?;
        }
        self.chain.pop();
        Ok(())
    }

    fn source(&self) -> RecordSource {
        if self.chain.is_empty() {
            RecordSource::TopLevel
        } else {
            RecordSource::Block {
                path: self.chain.clone(),
            }
        }
    }
}

/// 块内位于图层 `0` 的实体继承块参照所在图层。
fn effective_layer(own: &str, parent: Option<&str>) -> String {
    match parent {
        Some(parent) if own == "0" => parent.to_string(),
        _ => own.to_string(),
    }
}

/// 把实体自身的 OCS 接在外层块变换之后；拉伸方向为 +Z 时原样返回。
fn in_ocs(transform: Option<DAffine2>, extrusion: DVec3) -> Option<DAffine2> {
    match (transform, ocs_to_wcs(extrusion)) {
        (Some(parent), Some(ocs)) => Some(parent * ocs),
        (parent, None) => parent,
        (None, ocs) => ocs,
    }
}

/// 用块变换的线性部分推出文字在世界坐标中的方向与沿向缩放。
fn place(transform: Option<DAffine2>, insert: Point2, rotation: f64) -> Placement {
    let Some(transform) = transform else {
        return Placement {
            point: insert,
            rotation,
            scale: Vector2::new(1.0, 1.0),
        };
    };

    let (sin, cos) = rotation.sin_cos();
    let along = transform.transform_vector2(DVec2::new(cos, sin));
    let across = transform.transform_vector2(DVec2::new(-sin, cos));
    let mirror = if transform.matrix2.determinant() < 0.0 {
        -1.0
    } else {
        1.0
    };

    Placement {
        point: Point2::from_vec(transform.transform_point2(insert.as_vec2())),
        rotation: along.y.atan2(along.x),
        scale: Vector2::new(along.length(), across.length() * mirror),
    }
}
