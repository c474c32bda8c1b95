//! Library-vs-observed agreement across retention time.
//!
//! All strategies share the same time × fragment matrix and differ only in
//! how it is reduced to a score:
//!
//! - `Summed`: sum each fragment over time, one cosine against the library.
//! - `ConsensusApex`: cosine at the time point with the highest total signal.
//! - `TemporalCosine`: mean of the per-time-point cosines (points with signal).
//! - `WeightedTemporalCosineWithTransform`: same, weighted by the square root of
//!   the total signal per time point, then raised to `power`.

use super::matrix::IntensityMatrix;
use crate::utils::correlation::normalized_dot_product;
use diaquery::FragmentResult;
use serde::{
    Deserialize,
    Serialize,
};
use std::ops::Range;

/// Configuration-level name of a strategy, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringStrategyKind {
    Summed,
    ConsensusApex,
    TemporalCosine,
    WeightedTemporalCosineWithTransform,
}

impl std::fmt::Display for ScoringStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ScoringStrategy {
    Summed,
    ConsensusApex,
    #[default]
    TemporalCosine,
    WeightedTemporalCosineWithTransform { power: f32 },
}

impl ScoringStrategy {
    /// Attaches parameters to a kind. The transform power is clamped to >= 1.
    pub fn from_kind(kind: ScoringStrategyKind, nonlinear_power: f32) -> Self {
        match kind {
            ScoringStrategyKind::Summed => Self::Summed,
            ScoringStrategyKind::ConsensusApex => Self::ConsensusApex,
            ScoringStrategyKind::TemporalCosine => Self::TemporalCosine,
            ScoringStrategyKind::WeightedTemporalCosineWithTransform => {
                Self::WeightedTemporalCosineWithTransform {
                    power: sanitize_power(nonlinear_power),
                }
            }
        }
    }

    pub fn kind(&self) -> ScoringStrategyKind {
        match self {
            Self::Summed => ScoringStrategyKind::Summed,
            Self::ConsensusApex => ScoringStrategyKind::ConsensusApex,
            Self::TemporalCosine => ScoringStrategyKind::TemporalCosine,
            Self::WeightedTemporalCosineWithTransform { .. } => {
                ScoringStrategyKind::WeightedTemporalCosineWithTransform
            }
        }
    }
}

fn sanitize_power(power: f32) -> f32 {
    if power.is_finite() { power.max(1.0) } else { 1.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemporalScore {
    /// Score after any transform, in `[0, 1]`. NaN when not computable.
    pub dot_product: f32,
    /// Cosine before the nonlinear transform.
    pub raw_cosine: f32,
    pub time_points_used: usize,
    /// Row of the highest total signal, for strategies that track it.
    pub apex_time_index: Option<usize>,
}

impl TemporalScore {
    pub const INSUFFICIENT: TemporalScore = TemporalScore {
        dot_product: f32::NAN,
        raw_cosine: f32::NAN,
        time_points_used: 0,
        apex_time_index: None,
    };

    pub fn is_insufficient(&self) -> bool {
        self.dot_product.is_nan()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalScorer {
    strategy: ScoringStrategy,
}

impl TemporalScorer {
    pub fn new(strategy: ScoringStrategy) -> Self {
        let strategy = match strategy {
            ScoringStrategy::WeightedTemporalCosineWithTransform { power } => {
                ScoringStrategy::WeightedTemporalCosineWithTransform {
                    power: sanitize_power(power),
                }
            }
            other => other,
        };
        Self { strategy }
    }

    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    /// Scores one precursor straight from its extraction results.
    ///
    /// `fragment_results` holds the results of the precursor's queries in
    /// library fragment order; only the first `fragment_count` are used.
    pub fn score_precursor(
        &self,
        library_intensities: &[f32],
        fragment_count: usize,
        fragment_results: &[FragmentResult],
        rt_buffer: &[f32],
        intensity_buffer: &[f32],
    ) -> TemporalScore {
        if fragment_count < 2 || fragment_results.len() < fragment_count {
            return TemporalScore::INSUFFICIENT;
        }
        let mut matrix = IntensityMatrix::new();
        if !matrix.fill_from_xics(&fragment_results[..fragment_count], rt_buffer, intensity_buffer) {
            return TemporalScore::INSUFFICIENT;
        }
        self.score_matrix(library_intensities, &matrix, matrix.all_rows())
    }

    /// Scores the given rows of an already built matrix.
    pub fn score_matrix(
        &self,
        library_intensities: &[f32],
        matrix: &IntensityMatrix,
        rows: Range<usize>,
    ) -> TemporalScore {
        if matrix.n_fragments() < 2 {
            return TemporalScore::INSUFFICIENT;
        }
        let rows = matrix.clamp_rows(rows);
        if rows.is_empty() {
            return TemporalScore::INSUFFICIENT;
        }
        match self.strategy {
            ScoringStrategy::Summed => score_summed(library_intensities, matrix, rows),
            ScoringStrategy::ConsensusApex => score_consensus_apex(library_intensities, matrix, rows),
            ScoringStrategy::TemporalCosine => {
                score_temporal_cosine(library_intensities, matrix, rows, false, 1.0)
            }
            ScoringStrategy::WeightedTemporalCosineWithTransform { power } => {
                score_temporal_cosine(library_intensities, matrix, rows, true, power)
            }
        }
    }
}

fn score_summed(library: &[f32], matrix: &IntensityMatrix, rows: Range<usize>) -> TemporalScore {
    let mut summed = vec![0.0f32; matrix.n_fragments()];
    let n_rows = rows.len();
    for t in rows {
        for (acc, v) in summed.iter_mut().zip(matrix.row(t)) {
            *acc += v;
        }
    }
    let dp = normalized_dot_product(library, &summed);
    TemporalScore {
        dot_product: dp,
        raw_cosine: dp,
        time_points_used: n_rows,
        apex_time_index: None,
    }
}

fn score_consensus_apex(
    library: &[f32],
    matrix: &IntensityMatrix,
    rows: Range<usize>,
) -> TemporalScore {
    let n_rows = rows.len();
    let Some(apex) = matrix.apex_row(rows) else {
        return TemporalScore::INSUFFICIENT;
    };
    let dp = normalized_dot_product(library, matrix.row(apex));
    TemporalScore {
        dot_product: dp,
        raw_cosine: dp,
        time_points_used: n_rows,
        apex_time_index: Some(apex),
    }
}

fn score_temporal_cosine(
    library: &[f32],
    matrix: &IntensityMatrix,
    rows: Range<usize>,
    use_weighting: bool,
    power: f32,
) -> TemporalScore {
    let lib_norm_sq: f32 = library
        .iter()
        .take(matrix.n_fragments())
        .map(|x| x * x)
        .sum();
    if lib_norm_sq <= 0.0 {
        return TemporalScore::INSUFFICIENT;
    }

    let mut weighted_sum = 0.0f32;
    let mut weight_sum = 0.0f32;
    let mut used = 0usize;
    let mut apex = None;
    let mut apex_total = 0.0f32;

    for t in rows {
        let row = matrix.row(t);
        let total: f32 = row.iter().sum();
        if total <= 0.0 {
            continue;
        }
        if total > apex_total {
            apex_total = total;
            apex = Some(t);
        }
        let cos_t = normalized_dot_product(library, row);
        if cos_t.is_nan() {
            continue;
        }
        let weight = if use_weighting { total.sqrt() } else { 1.0 };
        weighted_sum += weight * cos_t;
        weight_sum += weight;
        used += 1;
    }

    if weight_sum <= 0.0 || used == 0 {
        return TemporalScore::INSUFFICIENT;
    }
    let raw = weighted_sum / weight_sum;
    let transformed = if power > 1.0 {
        raw.max(0.0).powf(power)
    } else {
        raw
    };
    TemporalScore {
        dot_product: transformed,
        raw_cosine: raw,
        time_points_used: used,
        apex_time_index: apex,
    }
}

/// Every strategy evaluated on the same rows, for use as features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemporalScoreSet {
    pub summed: TemporalScore,
    pub consensus_apex: TemporalScore,
    pub temporal_cosine: TemporalScore,
    pub weighted_transform: TemporalScore,
}

impl TemporalScoreSet {
    pub fn get(&self, kind: ScoringStrategyKind) -> TemporalScore {
        match kind {
            ScoringStrategyKind::Summed => self.summed,
            ScoringStrategyKind::ConsensusApex => self.consensus_apex,
            ScoringStrategyKind::TemporalCosine => self.temporal_cosine,
            ScoringStrategyKind::WeightedTemporalCosineWithTransform => self.weighted_transform,
        }
    }
}

pub fn score_all(
    library_intensities: &[f32],
    matrix: &IntensityMatrix,
    rows: Range<usize>,
    nonlinear_power: f32,
) -> TemporalScoreSet {
    let score = |strategy| {
        TemporalScorer::new(strategy).score_matrix(library_intensities, matrix, rows.clone())
    };
    TemporalScoreSet {
        summed: score(ScoringStrategy::Summed),
        consensus_apex: score(ScoringStrategy::ConsensusApex),
        temporal_cosine: score(ScoringStrategy::TemporalCosine),
        weighted_transform: score(ScoringStrategy::WeightedTemporalCosineWithTransform {
            power: nonlinear_power,
        }),
    }
}

/// `1 - (2 / pi) * acos(cos)` with the cosine clamped to `[0, 1]`.
///
/// NaN in, NaN out.
pub fn spectral_angle(raw_cosine: f32) -> f32 {
    if raw_cosine.is_nan() {
        return f32::NAN;
    }
    1.0 - (2.0 / std::f32::consts::PI) * raw_cosine.clamp(0.0, 1.0).acos()
}
