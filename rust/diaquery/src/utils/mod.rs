pub mod tolerance_ranges;
mod tuple_range;

pub use tuple_range::{
    TupleRange,
    TupleRangeError,
};
