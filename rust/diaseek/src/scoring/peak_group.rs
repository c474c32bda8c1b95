//! Chromatographic peak-group detection.
//!
//! Collapses the time × fragment matrix of a precursor into a single
//! library-weighted composite trace, smooths it, and picks the local
//! maximum whose boundaries enclose the most raw composite signal, so a
//! narrow spike loses against a broader profile of similar height.
//!
//! # Usage
//!
//! ```ignore
//! // One detector per thread, buffers are reused across calls.
//! let mut detector = PeakGroupDetector::new(128);
//! let peak = detector.detect(matrix.values(), matrix.ref_rts(), lib, n_frag, n_time);
//! if let Some(peak) = peak.as_option() {
//!     println!("apex at {} min, {} scans", peak.apex_rt, peak.scan_count);
//! }
//! ```

use super::matrix::IntensityMatrix;
use serde::Serialize;

pub const MIN_TIME_POINTS: usize = 3;
pub const MIN_FRAGMENTS: usize = 2;
pub const SMOOTHING_HALF_WIDTH: usize = 2;
/// Candidate apexes must reach this fraction of the smoothed maximum.
pub const CANDIDATE_FRACTION_OF_MAX: f32 = 0.10;
pub const MAX_CANDIDATES: usize = 8;
/// Boundary descent stops below this fraction of the candidate apex.
pub const BOUNDARY_FRACTION_OF_APEX: f32 = 0.05;
pub const MIN_SCAN_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakGroup {
    pub apex_index: usize,
    pub apex_rt: f32,
    pub left_index: usize,
    pub left_rt: f32,
    pub right_index: usize,
    pub right_rt: f32,
    /// `right_rt - left_rt`, minutes.
    pub width: f32,
    /// Relative apex position inside the peak, 0.5 is centred.
    pub symmetry: f32,
    pub scan_count: usize,
    /// Sum of the raw (unsmoothed) composite over the boundaries.
    pub total_signal: f32,
    pub candidate_count: usize,
    pub is_valid: bool,
}

impl PeakGroup {
    pub const NONE: PeakGroup = PeakGroup {
        apex_index: 0,
        apex_rt: f32::NAN,
        left_index: 0,
        left_rt: f32::NAN,
        right_index: 0,
        right_rt: f32::NAN,
        width: 0.0,
        symmetry: f32::NAN,
        scan_count: 0,
        total_signal: 0.0,
        candidate_count: 0,
        is_valid: false,
    };

    pub fn as_option(&self) -> Option<&PeakGroup> {
        if self.is_valid { Some(self) } else { None }
    }

    /// Rows covered by the peak, `left..=right` as a half-open range.
    pub fn row_range(&self) -> std::ops::Range<usize> {
        self.left_index..(self.right_index + 1)
    }
}

/// Fills `weights` with one composite weight per fragment.
///
/// Library intensities are L2-normalised; fragments beyond the library
/// get a uniform `1 / fragment_count`. An all-zero library behaves as if
/// its norm were 1, so every weight is 0 for covered fragments.
pub fn composite_weights(library_intensities: &[f32], fragment_count: usize, weights: &mut Vec<f32>) {
    let norm_sq: f32 = library_intensities.iter().map(|x| x * x).sum();
    let norm = if norm_sq > 0.0 { norm_sq.sqrt() } else { 1.0 };
    let uniform = 1.0 / fragment_count.max(1) as f32;

    weights.clear();
    weights.extend((0..fragment_count).map(|f| match library_intensities.get(f) {
        Some(&lib) => lib / norm,
        None => uniform,
    }));
}

/// Edge-truncated centred moving average.
pub fn moving_average_into(values: &[f32], half_width: usize, out: &mut Vec<f32>) {
    out.clear();
    let n = values.len();
    out.extend((0..n).map(|t| {
        let lo = t.saturating_sub(half_width);
        let hi = (t + half_width).min(n.saturating_sub(1));
        let window = &values[lo..=hi];
        window.iter().sum::<f32>() / window.len() as f32
    }));
}

/// Reusable peak-group detector.
///
/// Holds the scratch buffers of the detection so repeated calls on the
/// same thread do not allocate. Every call fully re-sizes the buffers, so
/// results never depend on a previous call.
#[derive(Debug, Default, Clone)]
pub struct PeakGroupDetector {
    weights: Vec<f32>,
    composite: Vec<f32>,
    smoothed: Vec<f32>,
    candidates: Vec<usize>,
}

impl PeakGroupDetector {
    pub fn new(capacity: usize) -> Self {
        Self {
            weights: Vec::new(),
            composite: Vec::with_capacity(capacity),
            smoothed: Vec::with_capacity(capacity),
            candidates: Vec::with_capacity(MAX_CANDIDATES),
        }
    }

    pub fn detect_matrix(&mut self, matrix: &IntensityMatrix, library_intensities: &[f32]) -> PeakGroup {
        self.detect(
            matrix.values(),
            matrix.ref_rts(),
            library_intensities,
            matrix.n_fragments(),
            matrix.n_time_points(),
        )
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn detect(
        &mut self,
        matrix: &[f32],
        ref_rts: &[f32],
        library_intensities: &[f32],
        fragment_count: usize,
        time_point_count: usize,
    ) -> PeakGroup {
        if time_point_count < MIN_TIME_POINTS
            || fragment_count < MIN_FRAGMENTS
            || matrix.len() < fragment_count * time_point_count
            || ref_rts.len() < time_point_count
        {
            return PeakGroup::NONE;
        }

        composite_weights(library_intensities, fragment_count, &mut self.weights);

        self.composite.clear();
        for t in 0..time_point_count {
            let row = &matrix[t * fragment_count..(t + 1) * fragment_count];
            let value: f32 = row
                .iter()
                .zip(self.weights.iter())
                .filter(|(obs, _)| **obs > 0.0)
                .map(|(obs, w)| obs * w)
                .sum();
            self.composite.push(value);
        }
        moving_average_into(&self.composite, SMOOTHING_HALF_WIDTH, &mut self.smoothed);

        let s = &self.smoothed;
        let (global_argmax, global_max) = s
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, &v)| {
                if v > acc.1 { (i, v) } else { acc }
            });
        if !(global_max > 0.0) {
            return PeakGroup::NONE;
        }

        let floor = global_max * CANDIDATE_FRACTION_OF_MAX;
        self.candidates.clear();
        for t in 1..(time_point_count - 1) {
            let (prev, cur, next) = (s[t - 1], s[t], s[t + 1]);
            if cur >= floor && cur >= prev && cur >= next && (cur > prev || cur > next) {
                self.candidates.push(t);
                if self.candidates.len() >= MAX_CANDIDATES {
                    break;
                }
            }
        }
        if self.candidates.is_empty() {
            // No strict local maximum, e.g. a flat or monotonic trace.
            // Use the centre of the run of values equal to the maximum.
            let mut plateau_end = global_argmax;
            while plateau_end + 1 < time_point_count && s[plateau_end + 1] == global_max {
                plateau_end += 1;
            }
            self.candidates.push((global_argmax + plateau_end) / 2);
        }

        let mut best: Option<(usize, usize, usize, f32)> = None;
        for &apex in self.candidates.iter() {
            let (left, right) = peak_boundaries(s, apex);
            if right + 1 - left < MIN_SCAN_COUNT {
                continue;
            }
            let total: f32 = self.composite[left..=right].iter().sum();
            match best {
                Some((_, _, _, best_total)) if total <= best_total => {}
                _ => best = Some((apex, left, right, total)),
            }
        }

        let Some((apex, left, right, total_signal)) = best else {
            return PeakGroup::NONE;
        };

        let apex_rt = ref_rts[apex];
        let left_rt = ref_rts[left];
        let right_rt = ref_rts[right];
        let width = right_rt - left_rt;
        let symmetry = if width > 0.0 {
            (apex_rt - left_rt) / width
        } else {
            0.5
        };

        PeakGroup {
            apex_index: apex,
            apex_rt,
            left_index: left,
            left_rt,
            right_index: right,
            right_rt,
            width,
            symmetry,
            scan_count: right + 1 - left,
            total_signal,
            candidate_count: self.candidates.len(),
            is_valid: true,
        }
    }
}

/// Walks outwards from `apex` until the smoothed trace drops below
/// [`BOUNDARY_FRACTION_OF_APEX`] of the apex or reaches a valley.
fn peak_boundaries(s: &[f32], apex: usize) -> (usize, usize) {
    let n = s.len();
    let threshold = s[apex] * BOUNDARY_FRACTION_OF_APEX;

    let mut left = apex;
    for t in (0..apex).rev() {
        if s[t] < threshold {
            left = t + 1;
            break;
        }
        if t > 0 && s[t] <= s[t - 1] && s[t] < s[t + 1] {
            left = t;
            break;
        }
        left = t;
    }

    let mut right = apex;
    for t in (apex + 1)..n {
        if s[t] < threshold {
            right = t - 1;
            break;
        }
        if t + 1 < n && s[t] <= s[t + 1] && s[t] < s[t - 1] {
            right = t;
            break;
        }
        right = t;
    }

    (left, right)
}

/// One-shot detection with freshly allocated buffers.
pub fn detect_peak_group(
    matrix: &[f32],
    ref_rts: &[f32],
    library_intensities: &[f32],
    fragment_count: usize,
    time_point_count: usize,
) -> PeakGroup {
    PeakGroupDetector::new(time_point_count).detect(
        matrix,
        ref_rts,
        library_intensities,
        fragment_count,
        time_point_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a row-major matrix where every fragment is `trace * scale[f]`.
    fn matrix_from_trace(trace: &[f32], scales: &[f32]) -> Vec<f32> {
        trace
            .iter()
            .flat_map(|&v| scales.iter().map(move |&s| v * s))
            .collect()
    }

    fn rts(n: usize) -> Vec<f32> {
        (0..n).map(|i| 10.0 + 0.1 * i as f32).collect()
    }

    #[test]
    fn test_degenerate_inputs_return_none() {
        let m = vec![1.0; 4];
        // Two time points only.
        let pg = detect_peak_group(&m, &rts(2), &[1.0, 1.0], 2, 2);
        assert!(!pg.is_valid);
        // One fragment only.
        let pg = detect_peak_group(&m, &rts(4), &[1.0], 1, 4);
        assert!(!pg.is_valid);
        // All zero.
        let z = vec![0.0; 10];
        let pg = detect_peak_group(&z, &rts(5), &[1.0, 1.0], 2, 5);
        assert!(!pg.is_valid);
    }

    #[test]
    fn test_flat_trace_spans_everything() {
        let trace = [100.0f32; 10];
        let m = matrix_from_trace(&trace, &[1.0, 0.0]);
        let rt = rts(10);
        let pg = detect_peak_group(&m, &rt, &[1.0, 0.0], 2, 10);
        assert!(pg.is_valid);
        assert_eq!(pg.left_index, 0);
        assert_eq!(pg.right_index, 9);
        assert_eq!(pg.scan_count, 10);
        assert!((pg.symmetry - 0.5).abs() < 0.1, "symmetry {}", pg.symmetry);
        assert!((pg.width - 0.9).abs() < 1e-4);
    }

    #[test]
    fn test_main_peak_beats_secondary_bump() {
        let mut trace = vec![0.0f32; 22];
        let main = [4.0, 14.0, 32.0, 61.0, 88.0, 100.0, 88.0, 61.0, 32.0, 14.0, 4.0];
        let bump = [2.0, 8.0, 16.0, 20.0, 16.0, 8.0, 2.0];
        trace[0..11].copy_from_slice(&main);
        trace[12..19].copy_from_slice(&bump);
        let m = matrix_from_trace(&trace, &[1.0, 0.5, 0.25]);
        let rt = rts(22);

        let pg = detect_peak_group(&m, &rt, &[1.0, 0.5, 0.25], 3, 22);
        assert!(pg.is_valid);
        assert_eq!(pg.apex_index, 5);
        assert_eq!(pg.candidate_count, 2);
        assert_eq!(pg.left_index, 0);
        assert_eq!(pg.right_index, 11);
        assert!((pg.apex_rt - rt[5]).abs() < 1e-6);
        assert!(pg.total_signal > 0.0);
    }

    #[test]
    fn test_wide_peak_beats_taller_spike() {
        // A one-point spike is smoothed away to a lower total than a broad peak.
        let mut trace = vec![0.0f32; 30];
        for (i, v) in [10.0, 30.0, 50.0, 60.0, 50.0, 30.0, 10.0].iter().enumerate() {
            trace[3 + i] = *v;
        }
        trace[22] = 200.0;
        let m = matrix_from_trace(&trace, &[1.0, 1.0]);
        let pg = detect_peak_group(&m, &rts(30), &[1.0, 1.0], 2, 30);
        assert!(pg.is_valid);
        assert_eq!(pg.apex_index, 6);
    }

    #[test]
    fn test_detector_is_deterministic_and_reusable() {
        let trace: Vec<f32> = (0..15)
            .map(|i| 100.0 * (-((i as f32 - 7.0).powi(2)) / 8.0).exp())
            .collect();
        let m = matrix_from_trace(&trace, &[1.0, 0.3, 0.6]);
        let rt = rts(15);
        let lib = [1.0, 0.3, 0.6];

        let mut detector = PeakGroupDetector::new(4);
        let first = detector.detect(&m, &rt, &lib, 3, 15);
        // Unrelated call in between must not leak state.
        let _ = detector.detect(&[1.0; 8], &rts(4), &[1.0, 1.0], 2, 4);
        let second = detector.detect(&m, &rt, &lib, 3, 15);
        assert_eq!(first, second);
        assert_eq!(first.apex_index, 7);
        assert!((first.symmetry - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_composite_weights() {
        let mut w = Vec::new();
        composite_weights(&[3.0, 4.0], 3, &mut w);
        assert!((w[0] - 0.6).abs() < 1e-6);
        assert!((w[1] - 0.8).abs() < 1e-6);
        assert!((w[2] - 1.0 / 3.0).abs() < 1e-6);

        composite_weights(&[0.0, 0.0], 2, &mut w);
        assert_eq!(w, vec![0.0, 0.0]);
    }

    #[test]
    fn test_composite_weight_monotonic_in_library_intensity() {
        let mut w = Vec::new();
        let mut last = -1.0;
        for lib in [0.5f32, 1.0, 2.0, 4.0, 8.0] {
            composite_weights(&[lib, 1.0, 1.0], 3, &mut w);
            assert!(w[0] >= last);
            last = w[0];
        }
    }

    #[test]
    fn test_moving_average_edges() {
        let mut out = Vec::new();
        moving_average_into(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-6);
        assert!((out[1] - 2.5).abs() < 1e-6);
        assert!((out[2] - 3.0).abs() < 1e-6);
        assert!((out[5] - 5.0).abs() < 1e-6);
    }
}
