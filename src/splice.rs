//! Byte-span edits over original source text.
//!
//! Both rewriting passes record `(start, end, replacement)` triples against
//! oxc spans and apply them in one go, last edit first, so earlier offsets
//! stay valid.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub start: u32,
    pub end: u32,
    pub replacement: String,
}

impl Splice {
    pub fn new(start: u32, end: u32, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    pub fn remove(start: u32, end: u32) -> Self {
        Self::new(start, end, "")
    }
}

/// Applies non-overlapping splices. Overlapping splices keep the one that
/// starts later and drop the other.
pub fn apply_splices(source: &str, splices: &[Splice]) -> String {
    let mut ordered: Vec<&Splice> = splices.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut result = source.to_string();
    let mut floor = u32::MAX;
    for splice in ordered {
        if splice.end > floor {
            continue;
        }
        let start = splice.start as usize;
        let end = (splice.end as usize).min(result.len());
        if start > end {
            continue;
        }
        result.replace_range(start..end, &splice.replacement);
        floor = splice.start;
    }
    result
}
