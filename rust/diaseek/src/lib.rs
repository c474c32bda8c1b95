//! DIA spectral library search.
//!
//! Turns library precursors into fragment XIC queries, scores the extracted
//! chromatograms against the library (peak-group detection plus temporal
//! cosine scoring), optionally calibrates retention time iteratively, and
//! annotates the results with target-decoy q-values.

pub mod errors;
pub mod models;
pub mod pipeline;
pub mod qvalues;
pub mod query_generation;
pub mod rt_calibration;
pub mod scoring;
pub mod utils;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use errors::{
    DiaSeekError,
    Result,
};
pub use models::{
    DiaSearchParameters,
    GenerationResult,
    LibraryPrecursorInput,
    PrecursorQueryGroup,
};
pub use pipeline::{
    DiaSearchBatch,
    DiaSearchOutput,
    DiaSearchPipeline,
};
pub use qvalues::{
    DiaFdrInfo,
    QValueMethod,
};
pub use rt_calibration::{
    CalibrationOutcome,
    CalibrationTermination,
    LinearRtFitter,
    RtCalibrationModel,
};
pub use scoring::{
    DiaSearchResult,
    ScoringStrategy,
    ScoringStrategyKind,
};
