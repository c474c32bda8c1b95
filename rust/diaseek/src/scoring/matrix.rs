//! Time × fragment intensity matrix shared by peak detection and scoring.

use crate::errors::DataProcessingError;
use diaquery::FragmentResult;
use diaquery::models::xic_slices;
use std::ops::Range;

/// Max RT difference (minutes) for a fragment point to land on a reference
/// grid point. Scans of one cycle agree to well within this.
pub const RT_ALIGNMENT_TOLERANCE_MINUTES: f32 = 0.01;

/// Dense row-major matrix, `values[t * n_fragments + f]`.
///
/// Rows follow the RT grid of the fragment with the most data points;
/// fragments without a point near a grid RT are zero there. Rebuilding
/// reuses the allocations, so one matrix per worker thread is enough.
#[derive(Debug, Clone, Default)]
pub struct IntensityMatrix {
    values: Vec<f32>,
    ref_rts: Vec<f32>,
    n_fragments: usize,
}

impl IntensityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dense(
        values: Vec<f32>,
        ref_rts: Vec<f32>,
        n_fragments: usize,
    ) -> Result<Self, DataProcessingError> {
        if values.len() != ref_rts.len() * n_fragments {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: ref_rts.len() * n_fragments,
                other: values.len(),
                context: "IntensityMatrix::from_dense".into(),
            });
        }
        Ok(Self {
            values,
            ref_rts,
            n_fragments,
        })
    }

    /// Rebuilds the matrix from the XICs of one precursor.
    ///
    /// Returns `false` (and leaves an empty matrix) when no fragment has
    /// any data point.
    pub fn fill_from_xics(
        &mut self,
        fragment_results: &[FragmentResult],
        rt_buffer: &[f32],
        intensity_buffer: &[f32],
    ) -> bool {
        self.values.clear();
        self.ref_rts.clear();
        self.n_fragments = fragment_results.len();

        let mut ref_idx = None;
        let mut max_points = 0;
        for (i, fr) in fragment_results.iter().enumerate() {
            if fr.data_point_count > max_points {
                max_points = fr.data_point_count;
                ref_idx = Some(i);
            }
        }
        let Some(ref_idx) = ref_idx else {
            return false;
        };

        let (ref_rts, _) = xic_slices(&fragment_results[ref_idx], rt_buffer, intensity_buffer);
        if ref_rts.is_empty() {
            return false;
        }
        self.ref_rts.extend_from_slice(ref_rts);
        self.values.resize(self.ref_rts.len() * self.n_fragments, 0.0);

        for (f, fr) in fragment_results.iter().enumerate() {
            if fr.data_point_count == 0 {
                continue;
            }
            let (rts, ints) = xic_slices(fr, rt_buffer, intensity_buffer);
            self.align_column(f, rts, ints);
        }
        true
    }

    /// Two-pointer merge of one fragment trace onto the reference grid.
    fn align_column(&mut self, fragment: usize, rts: &[f32], ints: &[f32]) {
        let n_frag = self.n_fragments;
        let mut ptr = 0;
        for (t, &ref_rt) in self.ref_rts.iter().enumerate() {
            if ptr >= rts.len() {
                break;
            }
            while ptr < rts.len() && rts[ptr] < ref_rt - RT_ALIGNMENT_TOLERANCE_MINUTES {
                ptr += 1;
            }
            if ptr < rts.len() && (rts[ptr] - ref_rt).abs() <= RT_ALIGNMENT_TOLERANCE_MINUTES {
                self.values[t * n_frag + fragment] = ints[ptr];
                ptr += 1;
            }
        }
    }

    pub fn n_fragments(&self) -> usize {
        self.n_fragments
    }

    pub fn n_time_points(&self) -> usize {
        self.ref_rts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_rts.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn ref_rts(&self) -> &[f32] {
        &self.ref_rts
    }

    pub fn all_rows(&self) -> Range<usize> {
        0..self.n_time_points()
    }

    pub fn row(&self, t: usize) -> &[f32] {
        &self.values[t * self.n_fragments..(t + 1) * self.n_fragments]
    }

    pub fn get(&self, t: usize, f: usize) -> f32 {
        self.values[t * self.n_fragments + f]
    }

    pub fn row_total(&self, t: usize) -> f32 {
        self.row(t).iter().sum()
    }

    /// First row with the highest positive total signal within `rows`.
    pub fn apex_row(&self, rows: Range<usize>) -> Option<usize> {
        let mut best = None;
        let mut best_total = 0.0f32;
        for t in rows {
            let total = self.row_total(t);
            if total > best_total {
                best_total = total;
                best = Some(t);
            }
        }
        best
    }

    /// Clamps a row range to the matrix.
    pub fn clamp_rows(&self, rows: Range<usize>) -> Range<usize> {
        let end = rows.end.min(self.n_time_points());
        rows.start.min(end)..end
    }
}
