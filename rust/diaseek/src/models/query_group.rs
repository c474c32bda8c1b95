use diaquery::FragmentQuery;
use serde::Serialize;
use std::ops::Range;

/// Slice of the flat query buffer owned by one precursor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrecursorQueryGroup {
    pub input_index: usize,
    pub query_offset: usize,
    pub query_count: usize,
    pub window_id: u32,
    pub rt_min: f32,
    pub rt_max: f32,
}

impl PrecursorQueryGroup {
    pub fn query_range(&self) -> Range<usize> {
        self.query_offset..(self.query_offset + self.query_count)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationResult {
    pub queries: Vec<FragmentQuery>,
    pub groups: Vec<PrecursorQueryGroup>,
    pub skipped_no_window: usize,
    pub skipped_no_fragments: usize,
}

impl GenerationResult {
    pub fn queries_for<'a>(&'a self, group: &PrecursorQueryGroup) -> &'a [FragmentQuery] {
        &self.queries[group.query_range()]
    }
}
