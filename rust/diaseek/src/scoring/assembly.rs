//! Extraction results to scored [`DiaSearchResult`]s.
//!
//! # Buffer reuse
//!
//! Every precursor needs an intensity matrix and the peak detector
//! scratch. Both are sized per precursor, so instead of allocating per
//! precursor each rayon worker gets one [`ScoringBuffers`] through
//! `map_init` and reuses it for every group it scores.
//!
//! # Per precursor
//!
//! 1. Fragment gate: at least `min_fragments_required` fragments with points.
//! 2. Build the time x fragment matrix once.
//! 3. Peak group detection on the matrix.
//! 4. Full-window apex cosine, temporal cosine and fragment correlations.
//! 5. The same features restricted to the peak (full window without one).
//! 6. Primary score from the configured strategy, spectral angle, RT features.
//! 7. Score threshold (NaN scores are never filtered).

use super::accumulator::DiaSearchAccumulator;
use super::features::{
    FragmentCorrelation,
    MIN_ACTIVE_FRAGMENTS,
    apex_cosine,
    fragment_correlations,
    temporal_cosine_active,
};
use super::matrix::IntensityMatrix;
use super::peak_group::{
    PeakGroup,
    PeakGroupDetector,
};
use super::search_results::{
    DiaScores,
    DiaSearchResult,
    DiaSearchResultBuilder,
    RtFeatures,
};
use super::temporal::{
    ScoringStrategy,
    score_all,
    spectral_angle,
};
use super::timings::AssemblyTimings;
use crate::errors::DataProcessingError;
use crate::models::{
    DiaSearchParameters,
    GenerationResult,
    LibraryPrecursorInput,
    PrecursorQueryGroup,
};
use crate::rt_calibration::RtCalibrationModel;
use crate::utils::correlation::normalized_dot_product;
use diaquery::ExtractionResult;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

/// RT deviations are capped here; unknown deviations get this value.
pub const MAX_RT_DEVIATION_MINUTES: f32 = 5.0;

/// Per-worker scratch for temporal assembly.
#[derive(Debug, Default)]
pub struct ScoringBuffers {
    matrix: IntensityMatrix,
    detector: PeakGroupDetector,
    correlated_fragments: Vec<usize>,
}

impl ScoringBuffers {
    pub fn new() -> Self {
        Self {
            matrix: IntensityMatrix::new(),
            detector: PeakGroupDetector::new(256),
            correlated_fragments: Vec::new(),
        }
    }
}

/// RT context of a result.
///
/// With a model the prediction comes from the library iRT (or RT) and the
/// RT score is the model log-likelihood of the capped deviation. Without
/// one the library RT is the prediction and the RT score is 0.
pub fn rt_features(
    precursor: &LibraryPrecursorInput,
    observed_apex_rt: f32,
    primary_score: f32,
    model: Option<&RtCalibrationModel>,
    rt_score_weight: f32,
) -> RtFeatures {
    let predicted_rt = match model {
        Some(m) => precursor
            .calibration_coordinate()
            .map(|c| m.predict(c) as f32),
        None => precursor.retention_time().map(|x| x as f32),
    }
    .unwrap_or(f32::NAN);

    let rt_deviation_minutes = if predicted_rt.is_finite() && observed_apex_rt.is_finite() {
        (observed_apex_rt - predicted_rt)
            .abs()
            .min(MAX_RT_DEVIATION_MINUTES)
    } else {
        MAX_RT_DEVIATION_MINUTES
    };

    let rt_score = match model {
        Some(m) => m.rt_score(rt_deviation_minutes as f64 / m.slope().abs()) as f32,
        None => 0.0,
    };

    RtFeatures {
        predicted_rt,
        rt_deviation_minutes,
        rt_score,
        rt_adjusted_score: primary_score + rt_score_weight * rt_score,
    }
}

fn check_extraction_len(
    generated: &GenerationResult,
    extraction: &ExtractionResult,
) -> Result<(), DataProcessingError> {
    if generated.queries.len() != extraction.results.len() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: generated.queries.len(),
            other: extraction.results.len(),
            context: "one extraction result per generated query".into(),
        });
    }
    Ok(())
}

fn fragments_detected(extraction: &ExtractionResult, group: &PrecursorQueryGroup) -> usize {
    extraction.results[group.query_range()]
        .iter()
        .filter(|x| x.data_point_count > 0)
        .count()
}

fn log_throughput(label: &str, num_items: usize, start: Instant, timings: &AssemblyTimings) {
    let elapsed = start.elapsed();
    let throughput = num_items as f64 / elapsed.as_secs_f64();
    info!(
        "{} {} precursors took: {:?} throughput: {:#.1}/s",
        label, num_items, elapsed, throughput
    );
    info!("{:?}", timings);
}

/// Single-cosine scoring on the per-fragment summed intensities.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn assemble_results(
    precursors: &[LibraryPrecursorInput],
    generated: &GenerationResult,
    extraction: &ExtractionResult,
    params: &DiaSearchParameters,
) -> Result<Vec<DiaSearchResult>, DataProcessingError> {
    check_extraction_len(generated, extraction)?;
    let mut out = Vec::with_capacity(generated.groups.len());
    for group in generated.groups.iter() {
        if fragments_detected(extraction, group) < params.min_fragments_required {
            continue;
        }
        let Some(precursor) = precursors.get(group.input_index) else {
            warn!("Group points at missing precursor {}", group.input_index);
            continue;
        };
        let fragment_results = &extraction.results[group.query_range()];
        let summed: Vec<f32> = fragment_results.iter().map(|x| x.total_intensity).collect();
        let dp = normalized_dot_product(precursor.fragment_intensities(), &summed);
        let scores = DiaScores {
            dot_product_score: dp,
            raw_cosine: dp,
            spectral_angle_score: spectral_angle(dp),
            summed_dot_product_score: dp,
            ..DiaScores::NAN
        };
        if !dp.is_nan() && dp < params.min_score_threshold {
            continue;
        }
        let result = DiaSearchResultBuilder::default()
            .with_precursor(precursor, group)
            .with_fragment_results(fragment_results)
            .with_scores(scores)
            .with_peak_group(PeakGroup::NONE)
            .with_rt_features(rt_features(
                precursor,
                f32::NAN,
                dp,
                None,
                params.rt_score_weight,
            ))
            .with_scoring_strategy(ScoringStrategy::Summed)
            .finalize()?;
        out.push(result);
    }
    Ok(out)
}

struct TemporalAssembler<'a> {
    precursors: &'a [LibraryPrecursorInput],
    extraction: &'a ExtractionResult,
    params: &'a DiaSearchParameters,
    strategy: ScoringStrategy,
    model: Option<&'a RtCalibrationModel>,
}

impl TemporalAssembler<'_> {
    fn score_group(
        &self,
        group: &PrecursorQueryGroup,
        buffers: &mut ScoringBuffers,
        timings: &mut AssemblyTimings,
    ) -> Option<DiaSearchResult> {
        if fragments_detected(self.extraction, group) < self.params.min_fragments_required {
            return None;
        }
        let Some(precursor) = self.precursors.get(group.input_index) else {
            warn!("Group points at missing precursor {}", group.input_index);
            return None;
        };
        let fragment_results = &self.extraction.results[group.query_range()];
        let library = precursor.fragment_intensities();

        let st = Instant::now();
        let has_data = buffers.matrix.fill_from_xics(
            fragment_results,
            &self.extraction.rt_buffer,
            &self.extraction.intensity_buffer,
        );
        timings.matrix_build += st.elapsed();

        let (scores, peak_group) = if has_data {
            let st = Instant::now();
            let peak_group = buffers.detector.detect_matrix(&buffers.matrix, library);
            timings.peak_detection += st.elapsed();

            let st = Instant::now();
            let scores = self.score_matrix(library, &peak_group, buffers);
            timings.scoring += st.elapsed();
            (scores, peak_group)
        } else {
            // Passed the fragment gate but nothing aligned: keep it, unscored.
            (DiaScores::NAN, PeakGroup::NONE)
        };

        let primary = scores.dot_product_score;
        if has_data && !primary.is_nan() && primary < self.params.min_score_threshold {
            return None;
        }

        let st = Instant::now();
        let out = DiaSearchResultBuilder::default()
            .with_precursor(precursor, group)
            .with_fragment_results(fragment_results)
            .with_scores(scores)
            .with_peak_group(peak_group)
            .with_rt_features(rt_features(
                precursor,
                scores.observed_apex_rt,
                primary,
                self.model,
                self.params.rt_score_weight,
            ))
            .with_scoring_strategy(self.strategy)
            .finalize();
        timings.finalization += st.elapsed();

        match out {
            Ok(res) => Some(res),
            Err(e) => {
                let e = e.append_to_context(&format!(" ({}/{})", precursor.sequence(), precursor.charge()));
                warn!("Error assembling result: {}", e);
                None
            }
        }
    }

    fn score_matrix(
        &self,
        library: &[f32],
        peak_group: &PeakGroup,
        buffers: &mut ScoringBuffers,
    ) -> DiaScores {
        let matrix = &buffers.matrix;
        let all_rows = matrix.all_rows();

        let full_apex = matrix.apex_row(all_rows.clone()).unwrap_or(0);
        let apex_dot_product_score = apex_cosine(library, matrix, full_apex);
        let (temporal_cosine_score, _) =
            temporal_cosine_active(library, matrix, all_rows.clone(), MIN_ACTIVE_FRAGMENTS);
        let full_corr =
            fragment_correlations(matrix, all_rows.clone(), &mut buffers.correlated_fragments);

        let (observed_apex_rt, peak_apex_score, peak_temporal_score, peak_corr) =
            match peak_group.as_option() {
                Some(pg) => (
                    pg.apex_rt,
                    apex_cosine(library, matrix, pg.apex_index),
                    temporal_cosine_active(library, matrix, pg.row_range(), MIN_ACTIVE_FRAGMENTS).0,
                    fragment_correlations(
                        matrix,
                        pg.row_range(),
                        &mut buffers.correlated_fragments,
                    ),
                ),
                None => (
                    matrix.ref_rts()[full_apex],
                    apex_dot_product_score,
                    temporal_cosine_score,
                    full_corr,
                ),
            };

        let primary_rows = match peak_group.as_option() {
            Some(pg) if self.params.score_within_peak_group => pg.row_range(),
            _ => all_rows,
        };
        let set = score_all(library, matrix, primary_rows, self.params.nonlinear_power);
        let primary = set.get(self.strategy.kind());

        let FragmentCorrelation {
            mean: mean_fragment_correlation,
            min: min_fragment_correlation,
        } = full_corr;
        DiaScores {
            dot_product_score: primary.dot_product,
            raw_cosine: primary.raw_cosine,
            spectral_angle_score: spectral_angle(primary.raw_cosine),
            apex_dot_product_score,
            temporal_cosine_score,
            summed_dot_product_score: set.summed.dot_product,
            mean_fragment_correlation,
            min_fragment_correlation,
            peak_apex_score,
            peak_temporal_score,
            peak_mean_fragment_correlation: peak_corr.mean,
            peak_min_fragment_correlation: peak_corr.min,
            time_points_used: primary.time_points_used,
            apex_time_index: primary.apex_time_index,
            observed_apex_rt,
        }
    }
}

/// Temporal scoring with peak-group detection, in parallel over groups.
///
/// `model` is the RT calibration the queries were generated with, if any;
/// it only feeds the RT features.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn assemble_results_with_temporal_scoring(
    precursors: &[LibraryPrecursorInput],
    generated: &GenerationResult,
    extraction: &ExtractionResult,
    params: &DiaSearchParameters,
    model: Option<&RtCalibrationModel>,
) -> Result<(Vec<DiaSearchResult>, AssemblyTimings), DataProcessingError> {
    check_extraction_len(generated, extraction)?;
    let start = Instant::now();
    let assembler = TemporalAssembler {
        precursors,
        extraction,
        params,
        strategy: params.scoring_strategy(),
        model,
    };

    #[cfg(not(feature = "serial_scoring"))]
    let results: DiaSearchAccumulator = generated
        .groups
        .par_iter()
        .with_min_len(256)
        .map_init(ScoringBuffers::new, |buffers, group| {
            let mut timings = AssemblyTimings::default();
            let res = assembler.score_group(group, buffers, &mut timings);
            (res, timings)
        })
        .collect();

    #[cfg(feature = "serial_scoring")]
    let results: DiaSearchAccumulator = {
        let mut buffers = ScoringBuffers::new();
        generated
            .groups
            .iter()
            .map(|group| {
                let mut timings = AssemblyTimings::default();
                let res = assembler.score_group(group, &mut buffers, &mut timings);
                (res, timings)
            })
            .collect()
    };

    log_throughput("Scoring", generated.groups.len(), start, &results.timings);
    Ok((results.res, results.timings))
}
