use crate::utils::tolerance_ranges::ppm_tol_range;
use serde::{
    Deserialize,
    Serialize,
};

/// A single XIC extraction request.
///
/// One query is emitted per library fragment. All queries of a precursor
/// share the same window id and RT window; `query_id` is the position of
/// the query in the flat query buffer it was generated into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FragmentQuery {
    pub target_mz: f32,
    pub tolerance_ppm: f32,
    pub rt_min: f32,
    pub rt_max: f32,
    pub window_id: u32,
    pub query_id: usize,
}

impl FragmentQuery {
    /// Inclusive m/z bounds implied by the ppm tolerance.
    pub fn mz_range(&self) -> (f64, f64) {
        ppm_tol_range(self.target_mz as f64, self.tolerance_ppm as f64)
    }

    pub fn rt_contains(&self, rt: f32) -> bool {
        self.rt_min <= rt && rt <= self.rt_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_ranges() {
        let q = FragmentQuery {
            target_mz: 500.0,
            tolerance_ppm: 20.0,
            rt_min: 1.0,
            rt_max: 2.0,
            window_id: 0,
            query_id: 0,
        };
        let (lo, hi) = q.mz_range();
        assert!((lo - 499.99).abs() < 1e-6);
        assert!((hi - 500.01).abs() < 1e-6);
        assert!(q.rt_contains(1.0));
        assert!(q.rt_contains(2.0));
        assert!(!q.rt_contains(2.01));
    }
}
