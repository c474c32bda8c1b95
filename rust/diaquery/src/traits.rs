use crate::errors::Result;
use crate::models::{
    ExtractionResult,
    FragmentQuery,
};

/// Lookup of isolation windows and run-level RT bounds.
pub trait ScanWindowIndex: Sync {
    /// Id of the first isolation window whose inclusive bounds contain
    /// `precursor_mz`, if any.
    fn find_window_for_precursor_mz(&self, precursor_mz: f64) -> Option<u32>;

    /// Lowest scan RT in minutes, 0 for an empty run.
    fn global_rt_min(&self) -> f32;

    /// Highest scan RT in minutes, 0 for an empty run.
    fn global_rt_max(&self) -> f32;
}

/// Batched XIC extraction.
///
/// Implementations must return exactly one `FragmentResult` per query, in
/// input order.
pub trait FragmentExtractor: Sync {
    fn extract(&self, queries: &[FragmentQuery]) -> Result<ExtractionResult>;
}
