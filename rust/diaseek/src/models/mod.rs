mod library_input;
mod params;
mod query_group;

pub use library_input::{
    LibraryPrecursorInput,
    read_library,
};
pub use params::DiaSearchParameters;
pub use query_group::{
    GenerationResult,
    PrecursorQueryGroup,
};
