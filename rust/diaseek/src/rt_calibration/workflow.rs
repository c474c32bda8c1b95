//! Iterative RT calibration: search with broad windows, fit on confident
//! targets, re-search with the narrower calibrated windows.

use super::fitter::{
    CalibrationAnchor,
    CalibrationFitter,
};
use super::model::RtCalibrationModel;
use crate::errors::Result;
use crate::models::{
    DiaSearchParameters,
    GenerationResult,
    LibraryPrecursorInput,
};
use crate::query_generation::{
    RtWindowSource,
    generate_with,
};
use crate::scoring::DiaSearchResult;
use diaquery::ScanWindowIndex;
use serde::Serialize;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

/// Sigma multiplier of the first (provisional) pass. The provisional model
/// is built so that this many sigmas span `initial_irt_window`.
pub const PROVISIONAL_SIGMA_MULTIPLIER: f64 = 3.0;

/// One scoring pass over a set of generated queries.
///
/// `model` is the calibration in effect for the pass, `None` for the
/// provisional one.
pub trait SearchPass {
    fn search_pass(
        &self,
        precursors: &[LibraryPrecursorInput],
        generated: &GenerationResult,
        model: Option<&RtCalibrationModel>,
    ) -> Result<Vec<DiaSearchResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationTermination {
    /// Slope changed less than `calibration_convergence_epsilon`.
    Converged,
    MaxIterationsReached,
    /// Not enough confident anchors to (re)fit; the last model is kept.
    InsufficientAnchors,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationIteration {
    pub iteration: usize,
    pub results: usize,
    pub anchors: usize,
    /// Half-width of the RT windows used in this pass, minutes.
    pub window_half_width_minutes: f64,
    pub model: Option<RtCalibrationModel>,
    pub slope_change: f64,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationOutcome {
    pub model: Option<RtCalibrationModel>,
    pub termination: CalibrationTermination,
    pub iterations: Vec<CalibrationIteration>,
}

/// Confident targets with an observed apex and a library coordinate.
pub fn select_anchors(
    precursors: &[LibraryPrecursorInput],
    results: &[DiaSearchResult],
    min_score: f32,
) -> Vec<CalibrationAnchor> {
    results
        .iter()
        .filter(|r| !r.is_decoy())
        .filter(|r| r.dot_product_score() >= min_score)
        .filter(|r| r.observed_apex_rt().is_finite())
        .filter_map(|r| {
            let coord = precursors.get(r.input_index())?.calibration_coordinate()?;
            Some(CalibrationAnchor {
                library_irt: coord,
                observed_rt_minutes: r.observed_apex_rt() as f64,
            })
        })
        .collect()
}

/// Range of iRT (or RT) values in the library, if any precursor has one.
pub fn library_coordinate_range(precursors: &[LibraryPrecursorInput]) -> Option<(f64, f64)> {
    precursors
        .iter()
        .filter_map(|p| p.calibration_coordinate())
        .filter(|x| x.is_finite())
        .fold(None, |acc, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((f64::min(lo, x), f64::max(hi, x))),
        })
}

#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn calibrate(
    precursors: &[LibraryPrecursorInput],
    scan_index: &impl ScanWindowIndex,
    params: &DiaSearchParameters,
    search: &impl SearchPass,
    fitter: &impl CalibrationFitter,
) -> Result<CalibrationOutcome> {
    let Some(irt_range) = library_coordinate_range(precursors) else {
        warn!("No library precursor has an iRT or RT, skipping RT calibration");
        return Ok(CalibrationOutcome {
            model: None,
            termination: CalibrationTermination::InsufficientAnchors,
            iterations: Vec::new(),
        });
    };
    let run_range = (
        scan_index.global_rt_min() as f64,
        scan_index.global_rt_max() as f64,
    );
    let provisional =
        RtCalibrationModel::provisional(run_range, irt_range, params.initial_irt_window);
    info!("Provisional RT model: {}", provisional);

    let mut current: Option<RtCalibrationModel> = None;
    let mut iterations = Vec::with_capacity(params.max_calibration_iterations);
    let mut termination = CalibrationTermination::MaxIterationsReached;

    for iteration in 0..params.max_calibration_iterations {
        let start = Instant::now();
        let (window_model, pass_params) = match current {
            Some(model) => (model, params.clone()),
            None => (
                provisional,
                DiaSearchParameters {
                    calibrated_window_sigma_multiplier: PROVISIONAL_SIGMA_MULTIPLIER,
                    ..params.clone()
                },
            ),
        };
        let generated = generate_with(
            precursors,
            scan_index,
            &pass_params,
            RtWindowSource::Calibrated(&window_model),
        );
        let results = search.search_pass(precursors, &generated, current.as_ref())?;
        let anchors = select_anchors(precursors, &results, params.calibration_anchor_min_score);

        let mut record = CalibrationIteration {
            iteration,
            results: results.len(),
            anchors: anchors.len(),
            window_half_width_minutes: window_model
                .window_half_width(pass_params.calibrated_window_sigma_multiplier),
            model: None,
            slope_change: f64::NAN,
            elapsed_ms: 0,
        };

        match fitter.fit(&anchors) {
            Ok(model) => {
                let slope_change = current
                    .map(|prev| (model.slope() - prev.slope()).abs())
                    .unwrap_or(f64::INFINITY);
                info!(
                    "Calibration iteration {}: {} anchors from {} results -> {}",
                    iteration,
                    anchors.len(),
                    results.len(),
                    model
                );
                if !model.is_reliable() {
                    warn!("RT calibration model is not reliable: {}", model);
                }
                record.model = Some(model);
                record.slope_change = slope_change;
                record.elapsed_ms = start.elapsed().as_millis();
                iterations.push(record);
                current = Some(model);
                if slope_change < params.calibration_convergence_epsilon {
                    termination = CalibrationTermination::Converged;
                    break;
                }
            }
            Err(err) => {
                warn!(
                    "Calibration iteration {} could not fit a model ({}), keeping the previous one",
                    iteration, err
                );
                record.elapsed_ms = start.elapsed().as_millis();
                iterations.push(record);
                termination = CalibrationTermination::InsufficientAnchors;
                break;
            }
        }
    }

    Ok(CalibrationOutcome {
        model: current,
        termination,
        iterations,
    })
}
