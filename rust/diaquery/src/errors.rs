use std::fmt::Display;

#[derive(Debug)]
pub enum DiaQueryError {
    DataProcessingError(DataProcessingError),
    Other(String),
}

impl Display for DiaQueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DiaQueryError {}

impl DiaQueryError {
    pub fn custom(msg: impl Display) -> Self {
        Self::Other(msg.to_string())
    }
}

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedOrderedRange {
        start: f64,
        end: f64,
        context: String,
    },
    ExpectedFiniteNonNanData {
        context: String,
    },
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DataProcessingError {}

impl From<DataProcessingError> for DiaQueryError {
    fn from(e: DataProcessingError) -> Self {
        DiaQueryError::DataProcessingError(e)
    }
}

pub type Result<T> = std::result::Result<T, DiaQueryError>;
