use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::font::{GlyphOutline, GlyphSource};

/// 单次运行内的字形缓存，键为（字体标识, 字符），不设容量上限。
#[derive(Debug)]
pub struct GlyphCache {
    tolerance_em: f64,
    fonts: HashMap<String, HashMap<char, Arc<GlyphOutline>>>,
    hits: usize,
    misses: usize,
}

impl GlyphCache {
    pub fn new(tolerance_em: f64) -> Self {
        Self {
            tolerance_em,
            fonts: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// 取出字形，首次请求时向字体提取；缺失的字符只在首次请求时记录诊断。
    pub fn get(
        &mut self,
        character: char,
        source: &dyn GlyphSource,
        diagnostics: &mut Diagnostics,
    ) -> Arc<GlyphOutline> {
        if let Some(outline) = self
            .fonts
            .get(source.identity())
            .and_then(|glyphs| glyphs.get(&character))
        {
            self.hits += 1;
            return Arc::clone(outline);
        }

        self.misses += 1;
        let tolerance = self.tolerance_em * source.units_per_em();
        let outline = match source.glyph(character, tolerance) {
            Some(outline) => outline,
            None => {
                diagnostics.push(Diagnostic::MissingGlyph {
                    character,
                    font: source.identity().to_string(),
                });
                GlyphOutline::missing(character, source.identity(), source.missing_advance())
            }
        };
        trace!(?character, rings = outline.rings.len(), "glyph extracted");

        let outline = Arc::new(outline);
        self.fonts
            .entry(source.identity().to_string())
            .or_default()
            .insert(character, Arc::clone(&outline));
        outline
    }

    pub fn len(&self) -> usize {
        self.fonts.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// （命中次数, 未命中次数）
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}
