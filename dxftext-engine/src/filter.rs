use std::collections::HashSet;

use tracing::debug;

use crate::collector::TextRecord;

/// 按整串精确匹配排除文字，不做大小写或空白归一化。
#[derive(Debug, Clone, Default)]
pub struct StringFilter {
    excluded: HashSet<String>,
}

impl StringFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn is_excluded(&self, content: &str) -> bool {
        self.excluded.contains(content)
    }

    #[inline]
    pub fn keeps(&self, record: &TextRecord) -> bool {
        !self.is_excluded(&record.content)
    }

    /// 返回保留的记录以及被排除的条数。
    pub fn retain(&self, records: Vec<TextRecord>) -> (Vec<TextRecord>, usize) {
        let total = records.len();
        let kept: Vec<TextRecord> = records
            .into_iter()
            .filter(|record| {
                let keep = self.keeps(record);
                if !keep {
                    debug!(content = %record.content, layer = %record.layer, "excluded text record");
                }
                keep
            })
            .collect();
        let excluded = total - kept.len();
        (kept, excluded)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use dxftext_core::geometry::{Point2, Vector2};

    use super::*;
    use crate::collector::{RecordSource, TextKind};

    fn record(content: &str) -> TextRecord {
        TextRecord {
            content: content.to_string(),
            insertion_point: Point2::new(0.0, 0.0),
            rotation_degrees: 0.0,
            height: 1.0,
            width_factor: 1.0,
            kind: TextKind::Text,
            scale: Vector2::new(1.0, 1.0),
            layer: "0".to_string(),
            style: None,
            source: RecordSource::TopLevel,
            block_transform: None,
        }
    }

    #[test]
    fn exclusion_is_exact_match() {
        let filter = StringFilter::new(["0", "0.0"]);
        assert!(!filter.keeps(&record("0")));
        assert!(!filter.keeps(&record("0.0")));
        assert!(filter.keeps(&record("00")));
        assert!(filter.keeps(&record(" 0")));
        assert!(filter.keeps(&record("0.00")));
    }

    #[test]
    fn exclusion_is_case_sensitive() {
        let filter = StringFilter::new(vec!["TEMP".to_string()]);
        assert!(!filter.keeps(&record("TEMP")));
        assert!(filter.keeps(&record("temp")));
    }

    #[test]
    fn retain_counts_excluded_records() {
        let filter = StringFilter::new(["0"]);
        let (kept, excluded) = filter.retain(vec![record("0"), record("00"), record("0"), record("A")]);
        assert_eq!(excluded, 2);
        let contents: Vec<_> = kept.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["00", "A"]);
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = StringFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        let (kept, excluded) = filter.retain(vec![record("0"), record("")]);
        assert_eq!(kept.len(), 2);
        assert_eq!(excluded, 0);
    }
}
