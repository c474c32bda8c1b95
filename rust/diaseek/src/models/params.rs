use crate::qvalues::QValueMethod;
use crate::scoring::temporal::{
    ScoringStrategy,
    ScoringStrategyKind,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Search configuration. Read-only for the duration of a search.
///
/// Every field has a default so partial JSON configs deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiaSearchParameters {
    /// Fragment m/z tolerance in ppm.
    pub ppm_tolerance: f32,
    /// Half-width of the fixed RT window around the library RT, in minutes.
    pub rt_tolerance_minutes: f32,
    pub min_fragments_required: usize,
    /// Results with a primary score below this are dropped. NaN scores are kept.
    pub min_score_threshold: f32,
    /// Worker threads; zero or negative means all available cores.
    pub max_threads: i32,
    /// There is no GPU extractor; a warning is logged and the CPU path is used.
    pub prefer_gpu: bool,

    pub use_irt_calibration: bool,
    /// Half-width of the first calibration pass window, in iRT units.
    pub initial_irt_window: f64,
    pub calibrated_window_sigma_multiplier: f64,
    pub calibration_anchor_min_score: f32,
    pub max_calibration_iterations: usize,
    /// Stop calibrating once the slope changes by less than this.
    pub calibration_convergence_epsilon: f64,
    /// Weight of the RT log-likelihood in `rt_adjusted_score`.
    pub rt_score_weight: f32,

    pub scoring_strategy: ScoringStrategyKind,
    /// Exponent of the weighted temporal cosine transform, clamped to >= 1.
    pub nonlinear_power: f32,
    /// Evaluate the primary score only inside the detected peak group.
    pub score_within_peak_group: bool,

    pub q_value_method: QValueMethod,
}

impl Default for DiaSearchParameters {
    fn default() -> Self {
        Self {
            ppm_tolerance: 20.0,
            rt_tolerance_minutes: 5.0,
            min_fragments_required: 3,
            min_score_threshold: 0.0,
            max_threads: -1,
            prefer_gpu: false,
            use_irt_calibration: false,
            initial_irt_window: 20.0,
            calibrated_window_sigma_multiplier: 3.0,
            calibration_anchor_min_score: 0.75,
            max_calibration_iterations: 3,
            calibration_convergence_epsilon: 0.01,
            rt_score_weight: 0.1,
            scoring_strategy: ScoringStrategyKind::TemporalCosine,
            nonlinear_power: 3.0,
            score_within_peak_group: false,
            q_value_method: QValueMethod::DecoyFraction,
        }
    }
}

impl DiaSearchParameters {
    pub fn effective_max_threads(&self) -> usize {
        if self.max_threads > 0 {
            self.max_threads as usize
        } else {
            std::thread::available_parallelism()
                .map(|x| x.get())
                .unwrap_or(1)
        }
    }

    /// Configured strategy with its parameters attached.
    pub fn scoring_strategy(&self) -> ScoringStrategy {
        ScoringStrategy::from_kind(self.scoring_strategy, self.nonlinear_power)
    }
}
