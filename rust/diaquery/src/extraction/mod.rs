mod cpu;

pub use cpu::{
    CpuFragmentExtractor,
    extract_xic_into,
};
