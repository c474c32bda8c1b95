mod accumulator;
pub mod assembly;
pub mod features;
pub mod matrix;
pub mod peak_group;
pub mod search_results;
pub mod temporal;
pub mod timings;

pub use assembly::{
    ScoringBuffers,
    assemble_results,
    assemble_results_with_temporal_scoring,
};
pub use matrix::IntensityMatrix;
pub use peak_group::{
    PeakGroup,
    PeakGroupDetector,
    detect_peak_group,
};
pub use search_results::{
    DiaScores,
    DiaSearchRecord,
    DiaSearchResult,
    DiaSearchResultBuilder,
    ResultParquetWriter,
    RtFeatures,
};
pub use temporal::{
    ScoringStrategy,
    ScoringStrategyKind,
    TemporalScore,
    TemporalScoreSet,
    TemporalScorer,
    score_all,
    spectral_angle,
};
pub use timings::AssemblyTimings;
