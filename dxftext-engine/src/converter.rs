use dxftext_core::document::Document;
use dxftext_core::feature::PlacedPolygon;
use tracing::{debug, info};

use crate::collector::collect_text_records;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::EngineError;
use crate::filter::StringFilter;
use crate::font::GlyphSource;
use crate::glyph_cache::GlyphCache;
use crate::layout::layout_record;
use crate::projector::CoordinateProjection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// 收集到的文字记录总数（含被排除的）。
    pub records: usize,
    pub excluded: usize,
    /// 输出的字符多边形数。
    pub characters: usize,
}

#[derive(Debug)]
pub struct ConversionOutput {
    pub features: Vec<PlacedPolygon>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ConversionStats,
    /// 实际使用的字体；没有需要渲染的文字时为 `None`。
    pub font: Option<String>,
}

/// 串联收集、过滤、排版与投影。字形缓存随转换器存在，覆盖整次运行。
pub struct Converter<'a> {
    filter: StringFilter,
    projection: &'a dyn CoordinateProjection,
    cache: GlyphCache,
}

impl<'a> Converter<'a> {
    pub fn new(
        filter: StringFilter,
        projection: &'a dyn CoordinateProjection,
        tolerance_em: f64,
    ) -> Self {
        Self {
            filter,
            projection,
            cache: GlyphCache::new(tolerance_em),
        }
    }

    #[inline]
    pub fn cache(&self) -> &GlyphCache {
        &self.cache
    }

    /// 执行一次转换。`load_font` 只在存在需要渲染的文字时调用。
    pub fn convert<F, S>(
        &mut self,
        document: &Document,
        load_font: F,
    ) -> Result<ConversionOutput, EngineError>
    where
        F: FnOnce(&mut Diagnostics) -> Result<S, EngineError>,
        S: GlyphSource,
    {
        let mut diagnostics = Diagnostics::new();
        let records = collect_text_records(document, &mut diagnostics)?;
        let total = records.len();
        let (kept, excluded) = self.filter.retain(records);
        info!(records = total, excluded, kept = kept.len(), "text records filtered");

        if kept.iter().all(|record| record.content.is_empty()) {
            debug!("nothing to render, font not loaded");
            return Ok(ConversionOutput {
                features: Vec::new(),
                diagnostics: diagnostics.into_vec(),
                stats: ConversionStats {
                    records: total,
                    excluded,
                    characters: 0,
                },
                font: None,
            });
        }

        let font = load_font(&mut diagnostics)?;
        let mut features = Vec::new();
        for record in &kept {
            let mut polygons = layout_record(record, &mut self.cache, &font, &mut diagnostics);
            for polygon in polygons.iter_mut() {
                self.projection.project_polygon(polygon)?;
            }
            debug!(
                content = %record.content,
                layer = %record.layer,
                polygons = polygons.len(),
                "record converted"
            );
            features.append(&mut polygons);
        }

        let (hits, misses) = self.cache.stats();
        info!(
            characters = features.len(),
            glyphs = self.cache.len(),
            hits,
            misses,
            "conversion finished"
        );

        Ok(ConversionOutput {
            stats: ConversionStats {
                records: total,
                excluded,
                characters: features.len(),
            },
            features,
            diagnostics: diagnostics.into_vec(),
            font: Some(font.identity().to_string()),
        })
    }
}
