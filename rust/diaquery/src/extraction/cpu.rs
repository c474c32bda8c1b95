//! CPU implementation of windowed XIC extraction.
//!
//! For every query the scans of its isolation window inside the RT window
//! are visited in RT order; within each scan the first peak inside the ppm
//! window is located with a binary search and all peaks up to the upper
//! bound are summed into a single chromatogram point. Scans without a
//! matching peak produce no point.

use crate::errors::Result;
use crate::models::{
    DiaScanIndex,
    ExtractionResult,
    FragmentQuery,
};
use crate::traits::FragmentExtractor;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Appends the XIC of `query` to `rts`/`intensities`, returning the number
/// of points written.
pub fn extract_xic_into(
    index: &DiaScanIndex,
    query: &FragmentQuery,
    rts: &mut Vec<f32>,
    intensities: &mut Vec<f32>,
) -> usize {
    let (mz_lo, mz_hi) = query.mz_range();
    let (mz_lo, mz_hi) = (mz_lo as f32, mz_hi as f32);
    let mut written = 0;

    for scan_idx in index.window_scans_in_rt_range(query.window_id, query.rt_min, query.rt_max) {
        let (mzs, ints) = index.scan_peaks(scan_idx);
        let start = mzs.partition_point(|&x| x < mz_lo);
        let mut total = 0.0f32;
        for (&mz, &inten) in mzs[start..].iter().zip(ints[start..].iter()) {
            if mz > mz_hi {
                break;
            }
            total += inten;
        }
        if total > 0.0 {
            rts.push(index.scan_rt(scan_idx));
            intensities.push(total);
            written += 1;
        }
    }
    written
}

#[derive(Debug, Clone, Copy)]
pub struct CpuFragmentExtractor<'a> {
    index: &'a DiaScanIndex,
    min_parallel_chunk: usize,
}

impl<'a> CpuFragmentExtractor<'a> {
    pub fn new(index: &'a DiaScanIndex) -> Self {
        Self {
            index,
            min_parallel_chunk: 256,
        }
    }

    pub fn with_min_parallel_chunk(mut self, min_parallel_chunk: usize) -> Self {
        self.min_parallel_chunk = min_parallel_chunk.max(1);
        self
    }

    pub fn extract_serial(&self, queries: &[FragmentQuery]) -> ExtractionResult {
        let mut out = ExtractionResult::with_capacity(queries.len(), queries.len() * 8);
        let mut rts = Vec::new();
        let mut ints = Vec::new();
        for q in queries {
            rts.clear();
            ints.clear();
            extract_xic_into(self.index, q, &mut rts, &mut ints);
            out.push_trace(q.query_id, &rts, &ints);
        }
        out
    }
}

impl FragmentExtractor for CpuFragmentExtractor<'_> {
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    fn extract(&self, queries: &[FragmentQuery]) -> Result<ExtractionResult> {
        let st = Instant::now();
        // Each worker fills its own traces, the merge keeps input order.
        let traces: Vec<(Vec<f32>, Vec<f32>)> = queries
            .par_iter()
            .with_min_len(self.min_parallel_chunk)
            .map(|q| {
                let mut rts = Vec::new();
                let mut ints = Vec::new();
                extract_xic_into(self.index, q, &mut rts, &mut ints);
                (rts, ints)
            })
            .collect();

        let num_points = traces.iter().map(|(r, _)| r.len()).sum();
        let mut out = ExtractionResult::with_capacity(queries.len(), num_points);
        for (q, (rts, ints)) in queries.iter().zip(traces.iter()) {
            out.push_trace(q.query_id, rts, ints);
        }
        debug!(
            "Extracted {} queries ({} points) in {:?}",
            queries.len(),
            out.total_data_points,
            st.elapsed()
        );
        Ok(out)
    }
}
