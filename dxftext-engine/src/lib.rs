pub mod collector;
pub mod converter;
pub mod diagnostics;
pub mod filter;
pub mod font;
pub mod glyph_cache;
pub mod layout;
pub mod projector;

pub mod errors {
    use thiserror::Error;

    use crate::font::FontError;
    use crate::projector::ProjectionError;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("block reference cycle detected: {}", chain.join(" -> "))]
        BlockCycle { chain: Vec<String> },
        #[error("no usable font available: {0}")]
        NoFontAvailable(String),
        #[error(transparent)]
        Projection(#[from] ProjectionError),
        #[error(transparent)]
        Font(#[from] FontError),
    }
}

pub use collector::{RecordSource, TextKind, TextRecord, collect_text_records};
pub use converter::{ConversionOutput, ConversionStats, Converter};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use errors::EngineError;
pub use filter::StringFilter;
pub use font::{FontError, FontFace, FontRequest, GlyphOutline, GlyphSource, resolve_font};
pub use glyph_cache::GlyphCache;
pub use layout::layout_record;
pub use projector::{CoordinateProjection, ProjectionError, Projector, parse_epsg_code};
