//! Auxiliary per-precursor features computed on a row range of the matrix.
//!
//! These use only observed (non-zero) fragments, so a fragment that is
//! simply not seen at a time point does not drag the cosine down.

use super::matrix::IntensityMatrix;
use crate::utils::correlation::{
    cosine_active_fragments,
    pearson_on_positive_pairs,
};
use serde::Serialize;
use std::ops::Range;

/// Time points with fewer observed fragments are ignored by the temporal cosine.
pub const MIN_ACTIVE_FRAGMENTS: usize = 3;
/// Fragments need this many non-zero points to take part in correlations,
/// and each pair needs this many shared non-zero points.
pub const MIN_CORRELATION_POINTS: usize = 3;
pub const MAX_CORRELATED_FRAGMENTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FragmentCorrelation {
    pub mean: f32,
    pub min: f32,
}

impl FragmentCorrelation {
    pub const NAN: FragmentCorrelation = FragmentCorrelation {
        mean: f32::NAN,
        min: f32::NAN,
    };
}

/// Cosine of a single row against the library over observed fragments.
pub fn apex_cosine(library: &[f32], matrix: &IntensityMatrix, row: usize) -> f32 {
    if row >= matrix.n_time_points() {
        return f32::NAN;
    }
    cosine_active_fragments(library, matrix.row(row))
}

/// Unweighted mean of per-row active-fragment cosines over `rows`.
///
/// Returns the score (NaN if no row qualifies) and the number of rows used.
pub fn temporal_cosine_active(
    library: &[f32],
    matrix: &IntensityMatrix,
    rows: Range<usize>,
    min_active_fragments: usize,
) -> (f32, usize) {
    let rows = matrix.clamp_rows(rows);
    let mut sum = 0.0f32;
    let mut used = 0usize;
    for t in rows {
        let row = matrix.row(t);
        let active = row.iter().filter(|&&x| x > 0.0).count();
        if active < min_active_fragments {
            continue;
        }
        let cos_t = cosine_active_fragments(library, row);
        if cos_t.is_nan() {
            continue;
        }
        sum += cos_t;
        used += 1;
    }
    if used == 0 {
        (f32::NAN, 0)
    } else {
        (sum / used as f32, used)
    }
}

/// Mean and minimum pairwise Pearson correlation between fragment traces.
///
/// `scratch` holds the indices of the participating fragments and is
/// cleared on entry.
pub fn fragment_correlations(
    matrix: &IntensityMatrix,
    rows: Range<usize>,
    scratch: &mut Vec<usize>,
) -> FragmentCorrelation {
    let rows = matrix.clamp_rows(rows);
    scratch.clear();
    if rows.len() < MIN_CORRELATION_POINTS {
        return FragmentCorrelation::NAN;
    }

    for f in 0..matrix.n_fragments() {
        if scratch.len() >= MAX_CORRELATED_FRAGMENTS {
            break;
        }
        let nonzero = rows.clone().filter(|&t| matrix.get(t, f) > 0.0).count();
        if nonzero >= MIN_CORRELATION_POINTS {
            scratch.push(f);
        }
    }
    if scratch.len() < 2 {
        return FragmentCorrelation::NAN;
    }

    let mut sum = 0.0f32;
    let mut min = f32::INFINITY;
    let mut n_pairs = 0usize;
    for (i, &fa) in scratch.iter().enumerate() {
        for &fb in scratch[i + 1..].iter() {
            let pairs = rows.clone().map(|t| (matrix.get(t, fa), matrix.get(t, fb)));
            let r = pearson_on_positive_pairs(pairs, MIN_CORRELATION_POINTS);
            if r.is_nan() {
                continue;
            }
            sum += r;
            min = min.min(r);
            n_pairs += 1;
        }
    }

    if n_pairs == 0 {
        return FragmentCorrelation::NAN;
    }
    FragmentCorrelation {
        mean: sum / n_pairs as f32,
        min,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f32]]) -> IntensityMatrix {
        let n_frag = rows[0].len();
        let values: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let rts: Vec<f32> = (0..rows.len()).map(|i| i as f32 * 0.1).collect();
        IntensityMatrix::from_dense(values, rts, n_frag).unwrap()
    }

    #[test]
    fn test_temporal_cosine_requires_active_fragments() {
        let lib = [1.0, 1.0, 1.0];
        let m = matrix(&[
            &[1.0, 1.0, 0.0],
            &[2.0, 2.0, 2.0],
            &[3.0, 3.0, 3.0],
        ]);
        let (score, used) = temporal_cosine_active(&lib, &m, m.all_rows(), MIN_ACTIVE_FRAGMENTS);
        assert_eq!(used, 2);
        assert!((score - 1.0).abs() < 1e-6);

        let (score, used) = temporal_cosine_active(&lib, &m, 0..1, MIN_ACTIVE_FRAGMENTS);
        assert!(score.is_nan());
        assert_eq!(used, 0);
    }

    #[test]
    fn test_fragment_correlations() {
        let m = matrix(&[
            &[1.0, 2.0, 5.0],
            &[2.0, 4.0, 4.0],
            &[3.0, 6.0, 3.0],
            &[4.0, 8.0, 2.0],
        ]);
        let mut scratch = Vec::new();
        let corr = fragment_correlations(&m, m.all_rows(), &mut scratch);
        // Pairs: (0,1) = 1, (0,2) = -1, (1,2) = -1.
        assert!((corr.mean - (-1.0 / 3.0)).abs() < 1e-5);
        assert!((corr.min + 1.0).abs() < 1e-5);

        // Too few rows.
        let corr = fragment_correlations(&m, 0..2, &mut scratch);
        assert!(corr.mean.is_nan());
        assert!(corr.min.is_nan());
    }

    #[test]
    fn test_apex_cosine_out_of_range() {
        let m = matrix(&[&[1.0, 1.0]]);
        assert!(apex_cosine(&[1.0, 1.0], &m, 3).is_nan());
        assert!((apex_cosine(&[1.0, 1.0], &m, 0) - 1.0).abs() < 1e-6);
    }
}
