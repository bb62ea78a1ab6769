//! 字体加载与字形轮廓提取。
//!
//! 轮廓以字体设计单位（units-per-em）表示，曲线按统一容差展平成闭合环，
//! 再按非零环绕规则分组为外环与孔洞。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dxftext_core::geometry::{close_ring, ring_contains, signed_area};
use fontdb::{Database, Family, Query};
use glam::DVec2;
use lyon::math::point;
use lyon::path::iterator::PathIterator;
use lyon::path::{Event, Path as LyonPath};
use thiserror::Error;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::EngineError;

/// 展平容差的下限（字体单位）。
const MIN_TOLERANCE: f32 = 0.01;
/// 既无 cmap 映射又无 `.notdef` 步进时的缺省步进，单位 em。
const MISSING_ADVANCE_EM: f64 = 0.5;

/// 通用字族对应的候选字族，按顺序取第一个已安装的。
const SANS_SERIF_FAMILIES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Helvetica",
    "Arial",
];
const SERIF_FAMILIES: &[&str] = &[
    "DejaVu Serif",
    "Liberation Serif",
    "Noto Serif",
    "Times New Roman",
    "Times",
];
const MONOSPACE_FAMILIES: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Menlo",
    "Courier New",
];

#[derive(Debug, Error)]
pub enum FontError {
    #[error("读取字体文件 {path:?} 失败: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("无法解析字体 {identity}: {reason}")]
    Parse { identity: String, reason: String },
    #[error("系统中没有可用字体")]
    NoSystemFont,
}

/// 外环在 `rings` 中的下标及其孔洞下标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingGroup {
    pub exterior: usize,
    pub holes: Vec<usize>,
}

/// 一个字符的轮廓，创建后不再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphOutline {
    pub character: char,
    pub font_identity: String,
    /// 闭合环，字体单位。
    pub rings: Vec<Vec<DVec2>>,
    pub shapes: Vec<RingGroup>,
    /// 水平步进，字体单位。
    pub advance: f64,
    /// 字体中找不到该字符。
    pub missing: bool,
}

impl GlyphOutline {
    pub fn from_rings(
        character: char,
        font_identity: impl Into<String>,
        rings: Vec<Vec<DVec2>>,
        advance: f64,
    ) -> Self {
        let rings: Vec<Vec<DVec2>> = rings.into_iter().filter_map(close_ring).collect();
        let shapes = group_rings(&rings);
        Self {
            character,
            font_identity: font_identity.into(),
            rings,
            shapes,
            advance,
            missing: false,
        }
    }

    /// 缺失字形：不产生几何，仅保留步进。
    pub fn missing(character: char, font_identity: impl Into<String>, advance: f64) -> Self {
        Self {
            character,
            font_identity: font_identity.into(),
            rings: Vec::new(),
            shapes: Vec::new(),
            advance,
            missing: true,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// 字形来源。渲染、缓存与排版只依赖这个接口。
pub trait GlyphSource {
    /// 字体标识，参与缓存键并写入要素属性。
    fn identity(&self) -> &str;

    fn units_per_em(&self) -> f64;

    /// 提取字符轮廓；字体中没有该字符时返回 `None`。
    fn glyph(&self, character: char, tolerance: f64) -> Option<GlyphOutline>;

    /// 缺失字符占用的步进（字体单位）。
    fn missing_advance(&self) -> f64 {
        self.units_per_em() * MISSING_ADVANCE_EM
    }
}

impl<T: GlyphSource + ?Sized> GlyphSource for &T {
    fn identity(&self) -> &str {
        (**self).identity()
    }

    fn units_per_em(&self) -> f64 {
        (**self).units_per_em()
    }

    fn glyph(&self, character: char, tolerance: f64) -> Option<GlyphOutline> {
        (**self).glyph(character, tolerance)
    }

    fn missing_advance(&self) -> f64 {
        (**self).missing_advance()
    }
}

/// 基于 ttf-parser 的字体，字节只在加载时从磁盘读取一次。
#[derive(Debug, Clone)]
pub struct FontFace {
    identity: String,
    data: Arc<[u8]>,
    index: u32,
    units_per_em: f64,
    notdef_advance: Option<f64>,
}

impl FontFace {
    pub fn from_file(path: &Path) -> Result<Self, FontError> {
        let data = fs::read(path).map_err(|source| FontError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path.display().to_string(), data, 0)
    }

    pub fn from_bytes(
        identity: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
        index: u32,
    ) -> Result<Self, FontError> {
        let identity = identity.into();
        let data = data.into();
        let face = ttf_parser::Face::parse(&data, index).map_err(|err| FontError::Parse {
            identity: identity.clone(),
            reason: err.to_string(),
        })?;

        let units_per_em = f64::from(face.units_per_em());
        let notdef_advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(f64::from);
        debug!(font = %identity, units_per_em, glyphs = face.number_of_glyphs(), "font parsed");

        Ok(Self {
            identity,
            data,
            index,
            units_per_em,
            notdef_advance,
        })
    }

    /// 按字族名查询系统字体（`sans-serif`、`serif`、`monospace` 为通用字族）。
    pub fn from_system(families: &[String]) -> Result<Self, FontError> {
        let mut db = Database::new();
        db.load_system_fonts();
        set_generic_family(&mut db, Family::SansSerif, SANS_SERIF_FAMILIES);
        set_generic_family(&mut db, Family::Serif, SERIF_FAMILIES);
        set_generic_family(&mut db, Family::Monospace, MONOSPACE_FAMILIES);
        Self::from_database(&db, families)
    }

    /// 在给定字体库中查询。都不匹配时退回 sans-serif，
    /// 再退回字重最接近常规、字族名排序最前的非等宽正体。
    fn from_database(db: &Database, families: &[String]) -> Result<Self, FontError> {
        let mut requested: Vec<Family<'_>> = families
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .map(|name| {
                if name.eq_ignore_ascii_case("sans-serif") || name.eq_ignore_ascii_case("sans") {
                    Family::SansSerif
                } else if name.eq_ignore_ascii_case("serif") {
                    Family::Serif
                } else if name.eq_ignore_ascii_case("monospace") {
                    Family::Monospace
                } else {
                    Family::Name(name)
                }
            })
            .collect();
        if requested.is_empty() {
            requested.push(Family::SansSerif);
        }

        let query = |families: &[Family<'_>]| {
            db.query(&Query {
                families,
                weight: fontdb::Weight::NORMAL,
                stretch: fontdb::Stretch::Normal,
                style: fontdb::Style::Normal,
            })
        };
        let id = query(&requested)
            .or_else(|| query(&[Family::SansSerif]))
            .or_else(|| last_resort_face(db))
            .ok_or(FontError::NoSystemFont)?;

        let identity = db
            .face(id)
            .map(|face| format!("system:{}", face.post_script_name))
            .ok_or(FontError::NoSystemFont)?;
        debug!(font = %identity, "system font selected");
        let (data, index) = db
            .with_face_data(id, |data, index| (data.to_vec(), index))
            .ok_or(FontError::NoSystemFont)?;
        Self::from_bytes(identity, data, index)
    }

    fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, self.index).ok()
    }
}

impl GlyphSource for FontFace {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn units_per_em(&self) -> f64 {
        self.units_per_em
    }

    fn glyph(&self, character: char, tolerance: f64) -> Option<GlyphOutline> {
        let face = self.face()?;
        let glyph_id = face.glyph_index(character)?;
        let advance = face
            .glyph_hor_advance(glyph_id)
            .map(f64::from)
            .unwrap_or(0.0);

        let mut builder = LyonOutlineBuilder::new();
        // 空格等字符没有轮廓，只有步进。
        if face.outline_glyph(glyph_id, &mut builder).is_none() {
            return Some(GlyphOutline::from_rings(
                character,
                self.identity.as_str(),
                Vec::new(),
                advance,
            ));
        }

        let tolerance = (tolerance as f32).max(MIN_TOLERANCE);
        let rings = flatten_path(&builder.build(), tolerance);
        Some(GlyphOutline::from_rings(
            character,
            self.identity.as_str(),
            rings,
            advance,
        ))
    }

    fn missing_advance(&self) -> f64 {
        self.notdef_advance
            .filter(|advance| *advance > 0.0)
            .unwrap_or(self.units_per_em * MISSING_ADVANCE_EM)
    }
}

/// 字体的查找顺序：命令行指定的文件、配置中的默认字体、系统字体。
#[derive(Debug, Clone, Default)]
pub struct FontRequest {
    pub path: Option<PathBuf>,
    pub default_font: Option<PathBuf>,
    pub fallback_families: Vec<String>,
}

/// 按 [`FontRequest`] 的顺序加载字体，每次回退都记录一条诊断。
pub fn resolve_font(
    request: &FontRequest,
    diagnostics: &mut Diagnostics,
) -> Result<FontFace, EngineError> {
    let requested = request
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<none>".to_string());
    let mut reason = String::from("未指定字体");

    if let Some(path) = &request.path {
        match FontFace::from_file(path) {
            Ok(face) => {
                info!(font = %face.identity(), "font loaded");
                return Ok(face);
            }
            Err(err) => reason = err.to_string(),
        }
    }

    if let Some(path) = &request.default_font {
        match FontFace::from_file(path) {
            Ok(face) => {
                diagnostics.push(Diagnostic::FontFallback {
                    requested,
                    used: face.identity().to_string(),
                    reason,
                });
                return Ok(face);
            }
            Err(err) => reason = format!("{reason}; {err}"),
        }
    }

    match FontFace::from_system(&request.fallback_families) {
        Ok(face) => {
            diagnostics.push(Diagnostic::FontFallback {
                requested,
                used: face.identity().to_string(),
                reason,
            });
            Ok(face)
        }
        Err(err) => Err(EngineError::NoFontAvailable(format!("{reason}; {err}"))),
    }
}

/// 把通用字族指向第一个已安装的候选字族。fontdb 默认的 "Arial" 等名字在
/// Linux 上通常不存在，不配置时通用字族查询总是落空。
fn set_generic_family(
    db: &mut Database,
    generic: Family<'_>,
    candidates: &[&str],
) -> Option<String> {
    let installed = candidates
        .iter()
        .find(|candidate| {
            db.faces()
                .any(|face| face.families.iter().any(|(name, _)| name.as_str() == **candidate))
        })?
        .to_string();
    match generic {
        Family::Serif => db.set_serif_family(installed.as_str()),
        Family::Monospace => db.set_monospace_family(installed.as_str()),
        _ => db.set_sans_serif_family(installed.as_str()),
    }
    Some(installed)
}

fn last_resort_face(db: &Database) -> Option<fontdb::ID> {
    let weight_distance =
        |face: &fontdb::FaceInfo| face.weight.0.abs_diff(fontdb::Weight::NORMAL.0);
    db.faces()
        .filter(|face| !face.monospaced && face.style == fontdb::Style::Normal)
        .min_by(|a, b| {
            weight_distance(*a)
                .cmp(&weight_distance(*b))
                .then_with(|| primary_family(a).cmp(primary_family(b)))
        })
        .or_else(|| db.faces().next())
        .map(|face| face.id)
}

fn primary_family(face: &fontdb::FaceInfo) -> &str {
    face.families
        .first()
        .map(|(name, _)| name.as_str())
        .unwrap_or(face.post_script_name.as_str())
}

/// 将 ttf-parser 的轮廓回调写入 lyon 路径。每个 `move_to` 开启一个新轮廓。
struct LyonOutlineBuilder {
    builder: lyon::path::Builder,
    contour_open: bool,
}

impl LyonOutlineBuilder {
    fn new() -> Self {
        Self {
            builder: LyonPath::builder(),
            contour_open: false,
        }
    }

    fn build(mut self) -> LyonPath {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
        self.builder.build()
    }
}

impl ttf_parser::OutlineBuilder for LyonOutlineBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.contour_open {
            self.builder.close();
        }
        self.builder.begin(point(x, y));
        self.contour_open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(point(x, y));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quadratic_bezier_to(point(x1, y1), point(x, y));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder
            .cubic_bezier_to(point(x1, y1), point(x2, y2), point(x, y));
    }

    fn close(&mut self) {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
    }
}

fn flatten_path(path: &LyonPath, tolerance: f32) -> Vec<Vec<DVec2>> {
    let mut rings = Vec::new();
    let mut current: Vec<DVec2> = Vec::new();
    for event in path.iter().flattened(tolerance) {
        match event {
            Event::Begin { at } => {
                current.clear();
                current.push(DVec2::new(f64::from(at.x), f64::from(at.y)));
            }
            Event::Line { to, .. } => current.push(DVec2::new(f64::from(to.x), f64::from(to.y))),
            Event::End { .. } => rings.push(std::mem::take(&mut current)),
            _ => {}
        }
    }
    rings
}

/// 按非零环绕规则分组。面积最大的环确定外环方向，同向的环都是外环；
/// 反向的环作为包含它的最小外环的孔洞，不在任何外环内时按外环输出。
pub fn group_rings(rings: &[Vec<DVec2>]) -> Vec<RingGroup> {
    let areas: Vec<f64> = rings.iter().map(|ring| signed_area(ring)).collect();
    let Some(dominant) = areas
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
    else {
        return Vec::new();
    };
    let is_filled = |area: f64| area.abs() > f64::EPSILON && area.signum() == dominant.signum();

    let mut groups: Vec<RingGroup> = areas
        .iter()
        .enumerate()
        .filter(|(_, area)| is_filled(**area))
        .map(|(exterior, _)| RingGroup {
            exterior,
            holes: Vec::new(),
        })
        .collect();
    let exterior_count = groups.len();

    for (hole, area) in areas.iter().enumerate() {
        if area.abs() <= f64::EPSILON || is_filled(*area) {
            continue;
        }
        let Some(&anchor) = rings[hole].first() else {
            continue;
        };
        let parent = (0..exterior_count)
            .filter(|&group| ring_contains(&rings[groups[group].exterior], anchor))
            .min_by(|&a, &b| {
                let area_a = areas[groups[a].exterior].abs();
                let area_b = areas[groups[b].exterior].abs();
                area_a.total_cmp(&area_b)
            });
        match parent {
            Some(group) => groups[group].holes.push(hole),
            None => groups.push(RingGroup {
                exterior: hole,
                holes: Vec::new(),
            }),
        }
    }
    groups
}
