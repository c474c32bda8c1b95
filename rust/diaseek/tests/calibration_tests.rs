mod common;

use common::*;
use diaseek::errors::{
    CalibrationError,
    Result,
};
use diaseek::rt_calibration::{
    CalibrationAnchor,
    CalibrationFitter,
    CalibrationTermination,
    LinearRtFitter,
    RtCalibrationModel,
    SearchPass,
    calibrate,
};
use diaseek::{
    DiaSearchParameters,
    DiaSearchResult,
    GenerationResult,
    LibraryPrecursorInput,
};
use std::cell::RefCell;
use std::sync::Mutex;

/// Returns no results and remembers the model slope of every pass.
#[derive(Default)]
struct RecordingSearch {
    passes: RefCell<Vec<Option<f64>>>,
    queries: RefCell<Vec<usize>>,
}

impl SearchPass for RecordingSearch {
    fn search_pass(
        &self,
        _precursors: &[LibraryPrecursorInput],
        generated: &GenerationResult,
        model: Option<&RtCalibrationModel>,
    ) -> Result<Vec<DiaSearchResult>> {
        self.passes.borrow_mut().push(model.map(|m| m.slope()));
        self.queries.borrow_mut().push(generated.queries.len());
        Ok(Vec::new())
    }
}

/// Hands out the given slopes in order, then fails.
struct ScriptedFitter {
    slopes: Mutex<Vec<f64>>,
}

impl ScriptedFitter {
    fn new(slopes: &[f64]) -> Self {
        let mut slopes = slopes.to_vec();
        slopes.reverse();
        Self {
            slopes: Mutex::new(slopes),
        }
    }
}

impl CalibrationFitter for ScriptedFitter {
    fn fit(
        &self,
        anchors: &[CalibrationAnchor],
    ) -> std::result::Result<RtCalibrationModel, CalibrationError> {
        match self.slopes.lock().unwrap().pop() {
            Some(slope) => RtCalibrationModel::try_new(slope, 1.0, 0.2, 0.99, 20),
            None => Err(CalibrationError::InsufficientAnchors {
                found: anchors.len(),
                required: 5,
            }),
        }
    }
}

fn params(max_iterations: usize) -> DiaSearchParameters {
    DiaSearchParameters {
        use_irt_calibration: true,
        max_calibration_iterations: max_iterations,
        calibration_convergence_epsilon: 0.01,
        ..Default::default()
    }
}

#[test]
fn test_converges_when_slope_settles() {
    let index = build_index();
    let search = RecordingSearch::default();
    let fitter = ScriptedFitter::new(&[0.6, 0.52, 0.515]);

    let out = calibrate(&library(), &index, &params(5), &search, &fitter).unwrap();
    assert_eq!(out.termination, CalibrationTermination::Converged);
    assert_eq!(out.iterations.len(), 3);
    assert_eq!(out.model.unwrap().slope(), 0.515);
    // First pass runs on the provisional model, later ones on the last fit.
    assert_eq!(*search.passes.borrow(), vec![None, Some(0.6), Some(0.52)]);
    assert!(out.iterations[0].slope_change.is_infinite());
    assert!((out.iterations[2].slope_change - 0.005).abs() < 1e-9);
}

#[test]
fn test_max_iterations_reached() {
    let index = build_index();
    let search = RecordingSearch::default();
    let fitter = ScriptedFitter::new(&[0.3, 0.6, 0.9]);

    let out = calibrate(&library(), &index, &params(2), &search, &fitter).unwrap();
    assert_eq!(out.termination, CalibrationTermination::MaxIterationsReached);
    assert_eq!(out.iterations.len(), 2);
    assert_eq!(out.model.unwrap().slope(), 0.6);
}

#[test]
fn test_zero_iterations() {
    let index = build_index();
    let search = RecordingSearch::default();
    let out = calibrate(&library(), &index, &params(0), &search, &LinearRtFitter::default())
        .unwrap();
    assert_eq!(out.termination, CalibrationTermination::MaxIterationsReached);
    assert!(out.model.is_none());
    assert!(search.passes.borrow().is_empty());
}

#[test]
fn test_fit_failure_keeps_previous_model() {
    let index = build_index();
    let search = RecordingSearch::default();
    let fitter = ScriptedFitter::new(&[0.45]);

    let out = calibrate(&library(), &index, &params(5), &search, &fitter).unwrap();
    assert_eq!(out.termination, CalibrationTermination::InsufficientAnchors);
    assert_eq!(out.iterations.len(), 2);
    assert!(out.iterations[1].model.is_none());
    assert_eq!(out.model.unwrap().slope(), 0.45);
}

#[test]
fn test_no_anchors_from_empty_search() {
    let index = build_index();
    let search = RecordingSearch::default();
    let out = calibrate(&library(), &index, &params(3), &search, &LinearRtFitter::default())
        .unwrap();
    assert_eq!(out.termination, CalibrationTermination::InsufficientAnchors);
    assert!(out.model.is_none());
    assert_eq!(out.iterations.len(), 1);
    assert_eq!(out.iterations[0].anchors, 0);
    // Every precursor with a window and fragments was queried.
    assert_eq!(
        search.queries.borrow()[0],
        (NUM_TARGETS + NUM_DECOYS) * LIBRARY_RATIOS.len()
    );
}

#[test]
fn test_library_without_coordinates() {
    let index = build_index();
    let search = RecordingSearch::default();
    let library = vec![
        LibraryPrecursorInput::try_new("NORTK", 600.0, 2, None, false, vec![300.0], vec![1.0])
            .unwrap(),
    ];
    let out = calibrate(&library, &index, &params(3), &search, &LinearRtFitter::default())
        .unwrap();
    assert_eq!(out.termination, CalibrationTermination::InsufficientAnchors);
    assert!(out.model.is_none());
    assert!(out.iterations.is_empty());
    assert!(search.passes.borrow().is_empty());
}
