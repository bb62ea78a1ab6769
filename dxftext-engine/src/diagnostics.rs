use std::fmt;

use tracing::warn;

/// 转换过程中可恢复的降级情况，不会中断运行。
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// 请求的字体不可用，改用了回退字体。
    FontFallback {
        requested: String,
        used: String,
        reason: String,
    },
    /// 字体中没有该字符，按空白字形处理。
    MissingGlyph { character: char, font: String },
    /// 块参照指向未定义的块，已跳过。
    MissingBlock { name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::FontFallback {
                requested,
                used,
                reason,
            } => write!(f, "字体 {requested} 不可用（{reason}），改用 {used}"),
            Diagnostic::MissingGlyph { character, font } => {
                write!(f, "字体 {font} 缺少字符 {character:?}")
            }
            Diagnostic::MissingBlock { name } => write!(f, "块定义 {name} 不存在，已跳过"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条诊断并以 `warn` 级别输出。
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!(%diagnostic, "conversion degraded");
        self.entries.push(diagnostic);
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
