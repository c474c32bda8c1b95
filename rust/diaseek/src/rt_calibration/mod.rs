mod fitter;
mod model;
mod workflow;

pub use fitter::{
    CalibrationAnchor,
    CalibrationFitter,
    LinearRtFitter,
};
pub use model::{
    RELIABLE_MIN_ANCHORS,
    RELIABLE_MIN_R_SQUARED,
    RtCalibrationModel,
};
pub use workflow::{
    CalibrationIteration,
    CalibrationOutcome,
    CalibrationTermination,
    PROVISIONAL_SIGMA_MULTIPLIER,
    SearchPass,
    calibrate,
    library_coordinate_range,
    select_anchors,
};
