//! Scan-level query layer for DIA runs.
//!
//! Holds an in-memory structure-of-arrays index of MS2 scans grouped by
//! isolation window and extracts fragment ion chromatograms (XICs) for
//! batches of [`FragmentQuery`]s.

pub mod errors;
pub mod extraction;
pub mod models;
pub mod traits;
pub mod utils;

pub use crate::errors::{
    DataProcessingError,
    DiaQueryError,
};
pub use crate::extraction::CpuFragmentExtractor;
pub use crate::models::{
    DiaScanIndex,
    DiaScanIndexBuilder,
    ExtractionResult,
    FragmentQuery,
    FragmentResult,
    RawScan,
};
pub use crate::traits::{
    FragmentExtractor,
    ScanWindowIndex,
};
pub use crate::utils::TupleRange;
