//! Per-stage timings of result assembly, summed over all precursors and
//! worker threads.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
pub struct AssemblyTimings {
    /// Aligning the fragment XICs into the intensity matrix.
    pub matrix_build: Duration,
    pub peak_detection: Duration,
    /// Temporal scores, auxiliary features and RT features.
    pub scoring: Duration,
    pub finalization: Duration,
}

impl Serialize for AssemblyTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AssemblyTimings", 4)?;
        state.serialize_field("matrix_build_ms", &self.matrix_build.as_millis())?;
        state.serialize_field("peak_detection_ms", &self.peak_detection.as_millis())?;
        state.serialize_field("scoring_ms", &self.scoring.as_millis())?;
        state.serialize_field("finalization_ms", &self.finalization.as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for AssemblyTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.matrix_build += rhs.matrix_build;
        self.peak_detection += rhs.peak_detection;
        self.scoring += rhs.scoring;
        self.finalization += rhs.finalization;
    }
}
