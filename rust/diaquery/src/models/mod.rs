pub mod extraction;
pub mod fragment_query;
pub mod scan_index;

pub use extraction::{
    ExtractionResult,
    FragmentResult,
    xic_slices,
};
pub use fragment_query::FragmentQuery;
pub use scan_index::{
    DiaScanIndex,
    DiaScanIndexBuilder,
    RawScan,
};
