mod geojson;

use std::fs;
use std::path::Path;

use dxftext_core::{
    document::{Attribute, BlockDefinition, BlockReference, Document, Entity, MText, Text},
    feature::PlacedPolygon,
    geometry::{Point2, Vector2, default_extrusion},
};
use glam::DVec3;
use thiserror::Error;

pub use geojson::GeoJsonWriter;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// 输出端：把排版、投影后的字符多边形写入目标文件。
pub trait FeatureSaver {
    fn save(&self, features: &[PlacedPolygon], path: &Path) -> Result<(), IoError>;
}

pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 直接解析内存中的 DXF 文本，测试与管道调用都经由此入口。
    pub fn parse_str(&self, data: &str) -> Result<Document, IoError> {
        let parser = DxfParser::new(data);
        parser.parse().map_err(|err| match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        })
    }
}

impl Default for DxfFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        // 旧版 DXF 多为 ANSI 代码页，按有损 UTF-8 解码以免整份文件无法读取。
        let data = String::from_utf8_lossy(&bytes);
        self.parse_str(&data)
    }
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                entity => match self.parse_entity(entity) {
                    Ok(parsed) => {
                        document.add_entity(parsed);
                    }
                    Err(DxfError::Unsupported { .. }) => {
                        // 与文字无关的实体（LINE、HATCH 等）直接跳过
                        self.skip_entity_body()?;
                    }
                    Err(err) => return Err(err),
                },
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition()? {
                        document.add_block_definition(definition);
                    }
                }
                _ => {
                    // 未预期的条目（例如孤立的 ENDBLK），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut collect_entities = true;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    entity_kind => {
                        if collect_entities {
                            match self.parse_entity(entity_kind) {
                                Ok(entity) => entities.push(entity),
                                Err(DxfError::Unsupported { .. }) => {
                                    self.skip_entity_body()?;
                                }
                                Err(err) => return Err(err),
                            }
                        } else {
                            self.skip_entity_body()?;
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => {
                        let trimmed = value.trim().to_string();
                        collect_entities = !is_layout_block(&trimmed);
                        name = Some(trimmed);
                    }
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {
                        // 其余块头字段（句柄、标志、描述等）与文字提取无关
                    }
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = match name {
            Some(name) => name,
            None => return Err(DxfError::invalid("BLOCK 缺少名称（组码 2）")),
        };

        if !collect_entities {
            return Ok(None);
        }

        Ok(Some(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        }))
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        match kind {
            "TEXT" => self.parse_text(),
            "MTEXT" => self.parse_mtext(),
            "INSERT" => self.parse_insert(),
            other => Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        }
    }

    fn parse_text(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut rotation_deg = 0.0;
        let mut width_factor = 1.0;
        let mut style: Option<String> = None;
        let mut paper_space = false;
        let mut extrusion = default_extrusion();
        let mut text: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => {
                        if insert_x.is_some() {
                            return Err(DxfError::invalid("TEXT 遇到重复的插入点 X（组码 10）"));
                        }
                        insert_x = Some(parse_f64(&value, "TEXT 插入点 X")?);
                    }
                    20 => {
                        if insert_y.is_some() {
                            return Err(DxfError::invalid("TEXT 遇到重复的插入点 Y（组码 20）"));
                        }
                        insert_y = Some(parse_f64(&value, "TEXT 插入点 Y")?);
                    }
                    40 => {
                        if height.is_some() {
                            return Err(DxfError::invalid("TEXT 遇到重复的文字高度（组码 40）"));
                        }
                        height = Some(parse_f64(&value, "TEXT 高度")?);
                    }
                    41 => width_factor = parse_f64(&value, "TEXT 宽度因子")?,
                    50 => {
                        rotation_deg = parse_f64(&value, "TEXT 旋转角")?;
                    }
                    67 => paper_space = parse_i16(&value, "TEXT 空间标志")? == 1,
                    210 | 220 | 230 => set_extrusion(&mut extrusion, code, &value, "TEXT")?,
                    7 => style = Some(value.trim().to_string()),
                    1 => {
                        // TEXT 只有一行内容，重复出现时以最后一次为准
                        text = Some(value);
                    }
                    _ => {
                        // 目前忽略：对齐方式、第二对齐点、倾斜角等
                    }
                },
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let content = text.unwrap_or_default();

        Ok(Entity::Text(Text {
            insert: Point2::new(insert_x.unwrap_or(0.0), insert_y.unwrap_or(0.0)),
            content: decode_inline_text(&content),
            height: height.unwrap_or(DEFAULT_TEXT_HEIGHT),
            rotation: rotation_deg.to_radians(),
            width_factor: sanitize_width_factor(width_factor),
            style,
            layer,
            extrusion,
            paper_space,
        }))
    }

    fn parse_mtext(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut reference_width: Option<f64> = None;
        let mut direction_x: Option<f64> = None;
        let mut direction_y: Option<f64> = None;
        let mut rotation_deg: Option<f64> = None;
        let mut attachment_point: i16 = 1;
        let mut line_spacing_factor: f64 = 1.0;
        let mut style: Option<String> = None;
        let mut paper_space = false;
        let mut trailing: Option<String> = None;
        let mut fragments: Vec<String> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => {
                        if insert_x.is_some() {
                            return Err(DxfError::invalid("MTEXT 遇到重复的插入点 X（组码 10）"));
                        }
                        insert_x = Some(parse_f64(&value, "MTEXT 插入点 X")?);
                    }
                    20 => {
                        if insert_y.is_some() {
                            return Err(DxfError::invalid("MTEXT 遇到重复的插入点 Y（组码 20）"));
                        }
                        insert_y = Some(parse_f64(&value, "MTEXT 插入点 Y")?);
                    }
                    40 => {
                        if height.is_some() {
                            return Err(DxfError::invalid("MTEXT 遇到重复的文本高度（组码 40）"));
                        }
                        height = Some(parse_f64(&value, "MTEXT 高度")?);
                    }
                    41 => {
                        let width = parse_f64(&value, "MTEXT 参考宽度")?;
                        reference_width = if width.abs() < f64::EPSILON {
                            None
                        } else {
                            Some(width)
                        };
                    }
                    11 => {
                        direction_x = Some(parse_f64(&value, "MTEXT 方向向量 X")?);
                    }
                    21 => {
                        direction_y = Some(parse_f64(&value, "MTEXT 方向向量 Y")?);
                    }
                    44 => {
                        line_spacing_factor = parse_f64(&value, "MTEXT 行距因子")?;
                    }
                    50 => {
                        rotation_deg = Some(parse_f64(&value, "MTEXT 旋转角")?);
                    }
                    67 => paper_space = parse_i16(&value, "MTEXT 空间标志")? == 1,
                    71 => {
                        attachment_point = parse_i16(&value, "MTEXT 附着点 (组码 71)")?;
                    }
                    7 => {
                        style = Some(value.trim().to_string());
                    }
                    // 组码 3 为前置的 250 字符分块，组码 1 为最后一块
                    3 => fragments.push(value),
                    1 => trailing = Some(value),
                    _ => {
                        // 其余字段（书写方向、背景填充等）暂未映射
                    }
                },
                None => return Err(DxfError::invalid("MTEXT 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        fragments.extend(trailing);

        let raw: String = fragments.concat();
        let decoded_text = decode_mtext_content(&raw);

        let direction = match (direction_x, direction_y) {
            (Some(x), Some(y)) if x.abs() >= f64::EPSILON || y.abs() >= f64::EPSILON => {
                Vector2::new(x, y)
            }
            _ => {
                if let Some(rot) = rotation_deg {
                    let rad = rot.to_radians();
                    Vector2::new(rad.cos(), rad.sin())
                } else {
                    Vector2::new(1.0, 0.0)
                }
            }
        };

        let line_spacing_factor = if line_spacing_factor > 0.0 {
            line_spacing_factor
        } else {
            1.0
        };

        Ok(Entity::MText(MText {
            insert: Point2::new(insert_x.unwrap_or(0.0), insert_y.unwrap_or(0.0)),
            content: decoded_text,
            height: height.unwrap_or(DEFAULT_TEXT_HEIGHT),
            reference_width,
            direction,
            attachment_point,
            line_spacing_factor,
            style,
            layer,
            paper_space,
        }))
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut paper_space = false;
        let mut extrusion = default_extrusion();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    2 => {
                        if name.is_some() {
                            return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                        }
                        name = Some(value.trim().to_string());
                    }
                    10 => {
                        if insert_x.is_some() {
                            return Err(DxfError::invalid("INSERT 遇到重复的插入点 X（组码 10）"));
                        }
                        insert_x = Some(parse_f64(&value, "INSERT 插入点 X")?);
                    }
                    20 => {
                        if insert_y.is_some() {
                            return Err(DxfError::invalid("INSERT 遇到重复的插入点 Y（组码 20）"));
                        }
                        insert_y = Some(parse_f64(&value, "INSERT 插入点 Y")?);
                    }
                    41 => {
                        scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?);
                    }
                    42 => {
                        scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?);
                    }
                    50 => {
                        rotation_deg = parse_f64(&value, "INSERT 旋转角")?;
                    }
                    67 => paper_space = parse_i16(&value, "INSERT 空间标志")? == 1,
                    210 | 220 | 230 => set_extrusion(&mut extrusion, code, &value, "INSERT")?,
                    _ => {
                        // 阵列参数等暂不支持
                    }
                },
                None => return Err(DxfError::invalid("INSERT 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or(1.0);

        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ATTRIB" => {
                        let attr = self.parse_attrib()?;
                        attributes.push(attr);
                    }
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(DxfError::invalid(format!(
                        "INSERT 属性段出现意外组码 {code} 值 {value}"
                    )));
                }
                None => break,
            }
        }

        Ok(Entity::BlockReference(BlockReference {
            name,
            insert: Point2::new(insert_x.unwrap_or(0.0), insert_y.unwrap_or(0.0)),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg.to_radians(),
            attributes,
            layer,
            extrusion,
            paper_space,
        }))
    }

    fn parse_attrib(&mut self) -> Result<Attribute, DxfError> {
        let mut layer = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut width_factor: f64 = 1.0;
        let mut text: Option<String> = None;
        let mut tag: Option<String> = None;
        let mut style: Option<String> = None;
        let mut flags: i16 = 0;
        let mut extrusion = default_extrusion();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => {
                        if insert_x.is_some() {
                            return Err(DxfError::invalid("ATTRIB 遇到重复的插入点 X（组码 10）"));
                        }
                        insert_x = Some(parse_f64(&value, "ATTRIB 插入点 X")?);
                    }
                    20 => {
                        if insert_y.is_some() {
                            return Err(DxfError::invalid("ATTRIB 遇到重复的插入点 Y（组码 20）"));
                        }
                        insert_y = Some(parse_f64(&value, "ATTRIB 插入点 Y")?);
                    }
                    40 => height = Some(parse_f64(&value, "ATTRIB 高度")?),
                    41 => width_factor = parse_f64(&value, "ATTRIB 宽度因子")?,
                    50 => {
                        rotation_deg = parse_f64(&value, "ATTRIB 旋转角")?;
                    }
                    1 => text = Some(value),
                    2 => tag = Some(value.trim().to_string()),
                    7 => style = Some(value.trim().to_string()),
                    70 => flags = parse_i16(&value, "ATTRIB 标志")?,
                    210 | 220 | 230 => set_extrusion(&mut extrusion, code, &value, "ATTRIB")?,
                    _ => {
                        // 对齐、锁定、多行属性等字段暂时忽略
                    }
                },
                None => return Err(DxfError::invalid("ATTRIB 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let text = text.unwrap_or_default();

        Ok(Attribute {
            tag: tag.unwrap_or_default(),
            text: decode_inline_text(&text),
            insert: Point2::new(insert_x.unwrap_or(0.0), insert_y.unwrap_or(0.0)),
            height: height.unwrap_or(DEFAULT_TEXT_HEIGHT),
            rotation: rotation_deg.to_radians(),
            width_factor: sanitize_width_factor(width_factor),
            style,
            is_invisible: flags & 0x01 != 0,
            layer,
            extrusion,
        })
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.trim_start_matches('\u{feff}').lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 文件末尾常见的空行不视为组码
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

/// 缺少组码 40 时采用的字高，与 AutoCAD 新建文字的缺省值一致。
const DEFAULT_TEXT_HEIGHT: f64 = 2.5;

fn set_extrusion(
    extrusion: &mut DVec3,
    code: i32,
    value: &str,
    entity: &str,
) -> Result<(), DxfError> {
    let component = parse_f64(value, &format!("{entity} 拉伸方向（组码 {code}）"))?;
    match code {
        210 => extrusion.x = component,
        220 => extrusion.y = component,
        _ => extrusion.z = component,
    }
    Ok(())
}

fn is_layout_block(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("*MODEL_SPACE") || upper.starts_with("*PAPER_SPACE")
}

fn sanitize_width_factor(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

/// 读取 `\U+XXXX` 转义中的四位十六进制码点。
fn take_unicode_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let mut lookahead = chars.clone();
    if lookahead.next() != Some('+') {
        return None;
    }
    let hex: String = lookahead.by_ref().take(4).collect();
    if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)?;
    *chars = lookahead;
    Some(decoded)
}

/// 处理 `%%d`、`%%p`、`%%c`、`%%%` 等控制码。
fn decode_percent_codes(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '%' && chars.peek() == Some(&'%') {
            let mut lookahead = chars.clone();
            lookahead.next();
            match lookahead.next() {
                Some('d') | Some('D') => result.push('°'),
                Some('p') | Some('P') => result.push('±'),
                Some('c') | Some('C') => result.push('⌀'),
                Some('%') => result.push('%'),
                // %%u / %%o 为下划线、上划线开关，不产生字符
                Some('u') | Some('U') | Some('o') | Some('O') => {}
                _ => {
                    result.push(ch);
                    continue;
                }
            }
            chars = lookahead;
        } else {
            result.push(ch);
        }
    }
    result
}

/// 单行文字（TEXT/ATTRIB）的内容解码。
fn decode_inline_text(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek().copied() {
                Some(marker @ ('U' | 'u')) => {
                    chars.next();
                    match take_unicode_escape(&mut chars) {
                        Some(decoded) => result.push(decoded),
                        None => {
                            result.push('\\');
                            result.push(marker);
                        }
                    }
                }
                _ => result.push(ch),
            }
        } else {
            result.push(ch);
        }
    }
    decode_percent_codes(&result)
}

/// 把 MTEXT 内容还原为纯文本：换行保留为 `\n`，字体、颜色、高度等格式命令全部去除。
fn decode_mtext_content(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' | '}' => {}
            '\\' => match chars.next() {
                Some('P') | Some('N') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some('{') => result.push('{'),
                Some('}') => result.push('}'),
                Some('U') | Some('u') => match take_unicode_escape(&mut chars) {
                    Some(decoded) => result.push(decoded),
                    None => result.push_str("\\U"),
                },
                Some('S') => {
                    // 堆叠分数 \Sa^b; 输出为 a/b
                    for next in chars.by_ref() {
                        match next {
                            ';' => break,
                            '^' | '#' => result.push('/'),
                            other => result.push(other),
                        }
                    }
                }
                Some('A' | 'C' | 'c' | 'F' | 'f' | 'H' | 'h' | 'Q' | 'q' | 'T' | 't' | 'W'
                | 'w' | 'p') => {
                    for next in chars.by_ref() {
                        if next == ';' {
                            break;
                        }
                    }
                }
                Some('L' | 'l' | 'O' | 'o' | 'K' | 'k' | 'X') => {}
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            },
            other => result.push(other),
        }
    }
    decode_percent_codes(&result)
}
